//! Range Interpolation
//!
//! This module turns a declared mapping ("input breakpoints to output
//! values") into a compiled function from `f64` to [`Value`].
//!
//! # Concepts
//!
//! ## Ranges
//!
//! An input range is a monotonic list of numbers; the output range holds one
//! value per breakpoint. Adjacent breakpoints form a segment, and each
//! segment has its own [`Easing`].
//!
//! ## Mixers
//!
//! Every output range belongs to one mix family: numbers, colors, or
//! compound strings with embedded numbers. The family is resolved once when
//! the range is compiled, and every query blends with that family's mixer.
//!
//! ## Compilation
//!
//! All validation happens in [`Interpolator::compile`]. A compiled
//! interpolator never fails: any `f64`, including values far outside the
//! input range, maps to an output.

mod color;
mod compound;
mod easing;
mod mix;
mod output;
mod range;

pub use color::Rgba;
pub use compound::{Compound, Slot, SlotKind, Template};
pub use easing::{CustomEasing, Easing};
pub use mix::{mix, mix_color, mix_compound, mix_number};
pub use output::{format_number, MixKind, Value};
pub use range::{interpolate, InterpolateOptions, Interpolator};
