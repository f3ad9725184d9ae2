//! Derivation Cache
//!
//! Hosts that rebuild their view every frame ask for the same range
//! transforms over and over. The cache gives each request site a slot: a
//! caller-chosen key naming the consumer, such as a component and property
//! pair.
//!
//! # How Slots Work
//!
//! 1. The first request for a slot compiles the range, binds it to the
//!    source and stores the derivation.
//!
//! 2. A later request with the same source and the same fingerprint returns
//!    the stored derivation: same output cell, same interpolator, no extra
//!    subscription on the source.
//!
//! 3. A request whose source or fingerprint differs tears the stored
//!    derivation down and replaces it, so a slot never holds more than one
//!    live binding.
//!
//! Entries whose source cell has been dropped are pruned whenever a slot is
//! rebuilt and at the end of every cycle.
//!
//! # Cycles
//!
//! A host render pass is bracketed by [`DerivationCache::begin_cycle`] and
//! [`DerivationCache::end_cycle`]. Every slot requested during the pass is
//! marked as used; `end_cycle` tears down the slots that were not, which
//! covers consumers that went away.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::binding::{bind_interpolator, Derivation};
use super::fingerprint::Fingerprint;
use crate::error::Result;
use crate::interpolate::{InterpolateOptions, Interpolator, Value};
use crate::value::{MotionCell, WeakCell};

struct CacheEntry {
    source: WeakCell<f64>,
    fingerprint: Fingerprint,
    derivation: Derivation<Value>,

    /// Last cycle in which this slot was requested.
    cycle: u64,
}

impl CacheEntry {
    fn matches(&self, source: &MotionCell<f64>, fingerprint: &Fingerprint) -> bool {
        self.source.id() == source.id()
            && self.fingerprint == *fingerprint
            && !self.derivation.is_stopped()
    }

    fn is_orphaned(&self) -> bool {
        self.source.upgrade().is_none()
    }
}

struct CacheState<K> {
    entries: IndexMap<K, CacheEntry>,
    cycle: u64,
}

impl<K> CacheState<K>
where
    K: Eq + Hash,
{
    /// Remove entries whose source is gone, returning their derivations.
    fn take_orphans(&mut self) -> Vec<Derivation<Value>> {
        let mut orphans = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.is_orphaned() {
                orphans.push(entry.derivation.clone());
                false
            } else {
                true
            }
        });
        orphans
    }
}

/// Registry of range derivations, one per consumer slot.
///
/// # Example
///
/// ```rust
/// use kinema_core::derive::DerivationCache;
/// use kinema_core::interpolate::{InterpolateOptions, Value};
/// use kinema_core::value::MotionCell;
///
/// let cache = DerivationCache::new();
/// let x = MotionCell::new(50.0);
/// let range = [Value::from(0), Value::from(1)];
///
/// let first = cache
///     .derive_range("card.opacity", &x, &[0.0, 100.0], &range, &InterpolateOptions::default())
///     .unwrap();
/// let again = cache
///     .derive_range("card.opacity", &x, &[0.0, 100.0], &range, &InterpolateOptions::default())
///     .unwrap();
///
/// assert!(first.ptr_eq(&again));
/// assert_eq!(x.subscriber_count(), 1);
/// ```
pub struct DerivationCache<K> {
    state: Mutex<CacheState<K>>,
}

impl<K> DerivationCache<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: IndexMap::new(),
                cycle: 0,
            }),
        }
    }

    /// Get or build the range derivation held by `slot`.
    ///
    /// An unchanged source and configuration returns the stored derivation.
    /// Anything else replaces it: the previous derivation is torn down
    /// before this call returns.
    pub fn derive_range(
        &self,
        slot: K,
        source: &MotionCell<f64>,
        input: &[f64],
        output: &[Value],
        options: &InterpolateOptions,
    ) -> Result<Derivation<Value>> {
        let fingerprint = Fingerprint::of_range(input, output, options)?;

        let (derivation, retired) = {
            let mut state = self.state.lock();
            let cycle = state.cycle;

            if let Some(entry) = state.entries.get_mut(&slot) {
                if entry.matches(source, &fingerprint) {
                    entry.cycle = cycle;
                    debug!(?slot, cell = source.id(), "derivation reused");
                    return Ok(entry.derivation.clone());
                }
            }

            // Compile before touching the slot so a bad configuration keeps
            // the previous binding alive.
            let interpolator = Arc::new(Interpolator::compile(input, output, options)?);
            let derivation = bind_interpolator(source, interpolator, fingerprint.clone());

            let mut retired = state.take_orphans();
            let entry = CacheEntry {
                source: source.downgrade(),
                fingerprint,
                derivation: derivation.clone(),
                cycle,
            };
            match state.entries.insert(slot.clone(), entry) {
                Some(previous) => {
                    debug!(?slot, cell = source.id(), "derivation recomposed");
                    retired.push(previous.derivation);
                }
                None => debug!(?slot, cell = source.id(), "derivation created"),
            }
            (derivation, retired)
        };

        for old in &retired {
            old.stop();
        }
        Ok(derivation)
    }

    /// Start a render cycle.
    pub fn begin_cycle(&self) {
        self.state.lock().cycle += 1;
    }

    /// Tear down every slot not requested since [`Self::begin_cycle`], and
    /// every slot whose source is gone.
    ///
    /// Returns the number of slots removed.
    pub fn end_cycle(&self) -> usize {
        let stale: Vec<Derivation<Value>> = {
            let mut state = self.state.lock();
            let cycle = state.cycle;
            let mut stale = Vec::new();
            state.entries.retain(|_, entry| {
                if entry.cycle == cycle && !entry.is_orphaned() {
                    true
                } else {
                    stale.push(entry.derivation.clone());
                    false
                }
            });
            stale
        };

        if !stale.is_empty() {
            debug!(removed = stale.len(), "derivation cycle swept");
        }
        for derivation in &stale {
            derivation.stop();
        }
        stale.len()
    }

    /// Tear down every slot whose source cell has been dropped.
    ///
    /// Returns the number of slots removed.
    pub fn prune(&self) -> usize {
        let orphans = self.state.lock().take_orphans();
        if !orphans.is_empty() {
            debug!(removed = orphans.len(), "orphaned derivations pruned");
        }
        for derivation in &orphans {
            derivation.stop();
        }
        orphans.len()
    }

    /// Remove and tear down the derivation held by `slot`. Returns false if
    /// the slot is empty.
    pub fn release(&self, slot: &K) -> bool {
        let removed = self.state.lock().entries.shift_remove(slot);
        match removed {
            Some(entry) => {
                debug!(?slot, "derivation released");
                entry.derivation.stop();
                true
            }
            None => false,
        }
    }

    /// Tear down every slot.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.state.lock().entries);
        if !entries.is_empty() {
            debug!(removed = entries.len(), "derivation cache cleared");
        }
        for entry in entries.values() {
            entry.derivation.stop();
        }
    }

    /// The derivation currently held by `slot`, if any.
    pub fn get(&self, slot: &K) -> Option<Derivation<Value>> {
        self.state
            .lock()
            .entries
            .get(slot)
            .map(|entry| entry.derivation.clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

impl<K> Default for DerivationCache<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debug for DerivationCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DerivationCache")
            .field("entries", &state.entries.len())
            .field("cycle", &state.cycle)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::Easing;

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::from).collect()
    }

    fn fade(
        cache: &DerivationCache<&'static str>,
        slot: &'static str,
        source: &MotionCell<f64>,
    ) -> Derivation<Value> {
        cache
            .derive_range(
                slot,
                source,
                &[0.0, 100.0],
                &numbers(&[0.0, 1.0]),
                &InterpolateOptions::default(),
            )
            .unwrap()
    }

    #[test]
    fn identical_requests_share_one_derivation() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(50.0);

        let first = fade(&cache, "fade", &x);
        let second = fade(&cache, "fade", &x);

        assert!(first.ptr_eq(&second));
        assert!(Arc::ptr_eq(
            first.interpolator().unwrap(),
            second.interpolator().unwrap()
        ));
        assert_eq!(x.subscriber_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_configuration_replaces_the_slot() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(50.0);

        let linear = fade(&cache, "fade", &x);
        let eased = cache
            .derive_range(
                "fade",
                &x,
                &[0.0, 100.0],
                &numbers(&[0.0, 1.0]),
                &InterpolateOptions::new().ease(Easing::EaseIn),
            )
            .unwrap();

        assert!(!linear.ptr_eq(&eased));
        assert!(linear.is_stopped());
        assert_eq!(eased.get(), Value::Number(0.25));
        assert_eq!(x.subscriber_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeated_reconfiguration_keeps_one_binding() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(1.0);

        let mut latest = None;
        for i in 1..=5 {
            let derivation = cache
                .derive_range(
                    "width",
                    &x,
                    &[0.0, 1.0],
                    &numbers(&[0.0, f64::from(i)]),
                    &InterpolateOptions::default(),
                )
                .unwrap();
            latest = Some(derivation);
        }

        assert_eq!(x.subscriber_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(latest.map(|d| d.get()), Some(Value::Number(5.0)));
    }

    #[test]
    fn changed_source_replaces_the_slot() {
        let cache = DerivationCache::new();
        let a = MotionCell::new(0.0);
        let b = MotionCell::new(100.0);

        let from_a = fade(&cache, "fade", &a);
        let from_b = fade(&cache, "fade", &b);

        assert!(!from_a.ptr_eq(&from_b));
        assert_eq!(from_a.fingerprint(), from_b.fingerprint());
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(from_b.get(), Value::Number(1.0));
    }

    #[test]
    fn distinct_slots_hold_independent_bindings() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(0.0);

        let left = fade(&cache, "left", &x);
        let right = fade(&cache, "right", &x);

        assert!(!left.ptr_eq(&right));
        assert_eq!(x.subscriber_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_reconfiguration_keeps_previous_binding() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(0.0);
        let kept = fade(&cache, "fade", &x);

        let err = cache.derive_range(
            "fade",
            &x,
            &[0.0, 1.0],
            &[Value::from(0.0), Value::from("#fff")],
            &InterpolateOptions::default(),
        );

        assert!(err.is_err());
        assert!(!kept.is_stopped());
        assert!(cache.get(&"fade").is_some_and(|d| d.ptr_eq(&kept)));
    }

    #[test]
    fn orphaned_slots_are_pruned() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(0.0);
        let y = MotionCell::new(0.0);
        let orphan = fade(&cache, "gone", &x);
        let _live = fade(&cache, "live", &y);

        drop(x);
        assert_eq!(cache.prune(), 1);
        assert!(orphan.is_stopped());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.prune(), 0);
    }

    #[test]
    fn end_cycle_sweeps_unrequested_slots() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(0.0);
        let y = MotionCell::new(0.0);

        cache.begin_cycle();
        let kept = fade(&cache, "x", &x);
        let dropped = fade(&cache, "y", &y);
        assert_eq!(cache.end_cycle(), 0);

        cache.begin_cycle();
        let kept_again = fade(&cache, "x", &x);
        assert_eq!(cache.end_cycle(), 1);

        assert!(kept.ptr_eq(&kept_again));
        assert!(!kept.is_stopped());
        assert!(dropped.is_stopped());
        assert_eq!(y.subscriber_count(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn release_tears_down_one_slot() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(0.0);
        let derivation = fade(&cache, "fade", &x);

        assert!(cache.release(&"fade"));
        assert!(!cache.release(&"fade"));
        assert!(derivation.is_stopped());
        assert_eq!(x.subscriber_count(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn stopped_entries_are_rebuilt_on_request() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(25.0);

        let first = fade(&cache, "fade", &x);
        first.stop();

        let second = fade(&cache, "fade", &x);
        assert!(!first.ptr_eq(&second));
        assert!(!second.is_stopped());
        assert_eq!(x.subscriber_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_tears_down_everything() {
        let cache = DerivationCache::new();
        let x = MotionCell::new(0.0);
        let y = MotionCell::new(0.0);
        let a = fade(&cache, "a", &x);
        let b = fade(&cache, "b", &y);

        cache.clear();

        assert!(cache.is_empty());
        assert!(a.is_stopped() && b.is_stopped());
        assert_eq!(x.subscriber_count() + y.subscriber_count(), 0);
    }
}
