//! Observable Values
//!
//! This module implements the observable value cell: the primitive every
//! animated property is stored in. Cells hold exactly one current value,
//! notify listeners synchronously when it changes, and remember enough of
//! their history to report a velocity.
//!
//! Cells know nothing about interpolation or derivation. Derived values are
//! ordinary cells that a [`crate::derive::Derivation`] writes into.

mod cell;
mod subscriber;

pub use cell::{cell, MotionCell, WeakCell};
pub use subscriber::{Listener, ListenerId, Subscription};
