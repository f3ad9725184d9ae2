//! Kinema Core
//!
//! This crate provides the value layer of the Kinema animation toolkit.
//! It implements:
//!
//! - Observable motion values with synchronous change notification
//! - Range interpolation over numbers, colors and compound strings
//! - Derived values bound to their sources, with structural reuse
//!
//! Timing, scheduling and rendering live outside this crate. A frame driver
//! sets source cells; everything derived from them is up to date by the time
//! `set` returns.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Observable cells and listener subscriptions
//! - `interpolate`: Easing curves, type mixers and compiled ranges
//! - `derive`: Bindings from source cells to derived cells
//! - `error`: The error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust
//! use kinema_core::{derive_direct, derive_range, InterpolateOptions, MotionCell, Value};
//!
//! // A source driven by a gesture or an animation
//! let x = MotionCell::new(0.0);
//!
//! // Fade out as the element is dragged away from the center
//! let opacity = derive_range(
//!     &x,
//!     &[-200.0, -100.0, 100.0, 200.0],
//!     &[Value::from(0), Value::from(1), Value::from(1), Value::from(0)],
//!     &InterpolateOptions::default(),
//! )
//! .unwrap();
//!
//! // Combine derived values with plain functions
//! let label = derive_direct(&[opacity.cell().clone()], |v| format!("opacity: {}", v[0]));
//!
//! x.set(150.0);
//! assert_eq!(opacity.get(), Value::Number(0.5));
//! assert_eq!(label.get(), "opacity: 0.5");
//! ```

pub mod derive;
pub mod error;
pub mod interpolate;
pub mod value;

pub use derive::{derive_direct, derive_map, derive_range, Derivation, DerivationCache};
pub use error::{MotionError, Result};
pub use interpolate::{interpolate, Easing, InterpolateOptions, Interpolator, Value};
pub use value::{cell, MotionCell, Subscription};
