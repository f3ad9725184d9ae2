//! Derived Cells
//!
//! This module binds derived cells to their sources.
//!
//! # Concepts
//!
//! ## Direct transforms
//!
//! [`derive_map`] and [`derive_direct`] wrap an arbitrary function. The
//! function is opaque, so it runs again on every source change.
//!
//! ## Range transforms
//!
//! [`derive_range`] maps a numeric source through an input/output range.
//! The range is compiled into an interpolator once, and its configuration
//! is summarized by a [`Fingerprint`].
//!
//! ## Reuse
//!
//! [`DerivationCache`] holds one range derivation per consumer slot.
//! Repeating an identical request is free and does not subscribe twice; a
//! changed configuration replaces the slot's binding.
//!
//! # Propagation
//!
//! Everything is synchronous. Setting a source runs its derivations, which
//! set their derived cells, which run their own listeners, all before the
//! source's `set` returns. Graphs are acyclic by construction: a derivation
//! can only read cells that already exist.

mod binding;
mod cache;
mod fingerprint;

pub use binding::{derive_direct, derive_map, derive_range, Derivation};
pub use cache::DerivationCache;
pub use fingerprint::Fingerprint;
