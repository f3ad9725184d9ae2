//! Derivation Implementation
//!
//! A `Derivation` owns a derived cell and keeps it in sync with one or more
//! source cells.
//!
//! # How Derivations Work
//!
//! 1. On construction, the derivation subscribes to every source and seeds
//!    its output cell by running the transform once.
//!
//! 2. When any source is set, the source's listener recomputes the transform
//!    from the current source values and sets the output cell. Anything
//!    subscribed to the output (including further derivations) runs before
//!    the source's `set` returns.
//!
//!    Listeners read the source again rather than trusting the notified
//!    value: an earlier listener may have set the source re-entrantly, and
//!    the output must end on the source's latest value.
//!
//! 3. When the derivation is stopped, or its last handle is dropped, it
//!    detaches from every source and stops its output cell.
//!
//! # Ownership
//!
//! Sources own their listeners, and those listeners own the output cell.
//! They never own the sources: every transform reads its inputs through
//! weak handles, so a derivation never keeps a source alive.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::fingerprint::Fingerprint;
use crate::error::Result;
use crate::interpolate::{InterpolateOptions, Interpolator, Value};
use crate::value::{MotionCell, Subscription, WeakCell};

/// Counter for generating unique derivation IDs.
static DERIVATION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique derivation ID.
fn next_derivation_id() -> u64 {
    DERIVATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Shared state behind every handle to one derivation.
struct DerivationInner<O>
where
    O: Clone + Send + Sync + 'static,
{
    id: u64,

    /// The derived cell. Consumers read and subscribe to it.
    output: MotionCell<O>,

    /// IDs of the source cells, in construction order.
    sources: SmallVec<[u64; 2]>,

    /// One subscription per source. Emptied on teardown.
    subscriptions: Mutex<SmallVec<[Subscription; 2]>>,

    /// Compiled range, for range transforms.
    interpolator: Option<Arc<Interpolator>>,

    fingerprint: Option<Fingerprint>,

    stopped: AtomicBool,
}

impl<O> DerivationInner<O>
where
    O: Clone + Send + Sync + 'static,
{
    /// Detach from the sources and stop the output. Returns false if the
    /// derivation was already torn down.
    fn teardown(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        self.output.stop();

        debug!(
            derivation = self.id,
            sources = self.sources.len(),
            "derivation torn down"
        );
        true
    }
}

impl<O> Drop for DerivationInner<O>
where
    O: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A derived cell kept in sync with its sources.
///
/// Cloning a derivation produces another handle to the same binding. The
/// binding is torn down by [`Derivation::stop`] or when the last handle is
/// dropped.
///
/// # Example
///
/// ```rust
/// use kinema_core::derive::derive_map;
/// use kinema_core::value::MotionCell;
///
/// let x = MotionCell::new(2.0);
/// let doubled = derive_map(&x, |v| v * 2.0);
/// assert_eq!(doubled.get(), 4.0);
///
/// x.set(5.0);
/// assert_eq!(doubled.get(), 10.0);
/// ```
pub struct Derivation<O>
where
    O: Clone + Send + Sync + 'static,
{
    inner: Arc<DerivationInner<O>>,
}

impl<O> Derivation<O>
where
    O: Clone + Send + Sync + 'static,
{
    fn new(
        output: MotionCell<O>,
        sources: SmallVec<[u64; 2]>,
        subscriptions: SmallVec<[Subscription; 2]>,
        interpolator: Option<Arc<Interpolator>>,
        fingerprint: Option<Fingerprint>,
    ) -> Self {
        let id = next_derivation_id();
        debug!(
            derivation = id,
            cell = output.id(),
            sources = sources.len(),
            "derivation bound"
        );

        Self {
            inner: Arc::new(DerivationInner {
                id,
                output,
                sources,
                subscriptions: Mutex::new(subscriptions),
                interpolator,
                fingerprint,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Get the derivation's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The derived cell.
    pub fn cell(&self) -> &MotionCell<O> {
        &self.inner.output
    }

    /// Current value of the derived cell.
    pub fn get(&self) -> O {
        self.inner.output.get()
    }

    /// Attach a listener to the derived cell.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.inner.output.on_change(listener)
    }

    /// IDs of the source cells.
    pub fn sources(&self) -> &[u64] {
        &self.inner.sources
    }

    /// Structural fingerprint, for range transforms.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.inner.fingerprint.as_ref()
    }

    /// The compiled interpolator, for range transforms.
    pub fn interpolator(&self) -> Option<&Arc<Interpolator>> {
        self.inner.interpolator.as_ref()
    }

    /// Detach from every source and stop the derived cell.
    ///
    /// Idempotent. The derived cell keeps its last value.
    pub fn stop(&self) {
        self.inner.teardown();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same binding.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<O> Clone for Derivation<O>
where
    O: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O> Debug for Derivation<O>
where
    O: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derivation")
            .field("id", &self.inner.id)
            .field("cell", &self.inner.output)
            .field("sources", &self.inner.sources)
            .field("fingerprint", &self.inner.fingerprint)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Derive a cell from a single source with an arbitrary function.
///
/// The function runs once to seed the output and again on every source
/// change.
pub fn derive_map<S, O, F>(source: &MotionCell<S>, transform: F) -> Derivation<O>
where
    S: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    F: Fn(&S) -> O + Send + Sync + 'static,
{
    let output = MotionCell::new(transform(&source.get()));

    let subscription = {
        let handle = source.downgrade();
        let output = output.clone();
        source.on_change(move |_| {
            if let Some(source) = handle.upgrade() {
                output.set(transform(&source.get()));
            }
        })
    };

    Derivation::new(
        output,
        smallvec::smallvec![source.id()],
        smallvec::smallvec![subscription],
        None,
        None,
    )
}

/// Derive a cell from several sources with an arbitrary function.
///
/// The function receives the current value of every source, in the order
/// given, and runs again whenever any of them changes.
pub fn derive_direct<S, O, F>(sources: &[MotionCell<S>], transform: F) -> Derivation<O>
where
    S: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    F: Fn(&[S]) -> O + Send + Sync + 'static,
{
    let transform = Arc::new(transform);
    let handles: Arc<[WeakCell<S>]> = sources.iter().map(MotionCell::downgrade).collect();

    let seed: Vec<S> = sources.iter().map(MotionCell::get).collect();
    let output = MotionCell::new(transform(&seed));

    let subscriptions = sources
        .iter()
        .map(|source| {
            let transform = Arc::clone(&transform);
            let handles = Arc::clone(&handles);
            let output = output.clone();
            source.on_change(move |_| {
                // A dropped source can no longer be read.
                if let Some(values) = read_all(&handles) {
                    output.set(transform(&values));
                }
            })
        })
        .collect();

    Derivation::new(
        output,
        sources.iter().map(MotionCell::id).collect(),
        subscriptions,
        None,
        None,
    )
}

fn read_all<S>(handles: &[WeakCell<S>]) -> Option<Vec<S>>
where
    S: Clone + Send + Sync + 'static,
{
    handles
        .iter()
        .map(|handle| handle.upgrade().map(|cell| cell.get()))
        .collect()
}

/// Derive a cell by mapping a numeric source through an input/output range.
///
/// The range is compiled once; every source change is a single
/// [`Interpolator::map`] call.
///
/// Each call compiles and subscribes anew. Hosts that rebuild their
/// bindings every frame should go through [`DerivationCache::derive_range`]
/// instead, which returns the existing binding for an unchanged
/// configuration.
///
/// [`DerivationCache::derive_range`]: super::DerivationCache::derive_range
/// # Example
///
/// ```rust
/// use kinema_core::derive::derive_range;
/// use kinema_core::interpolate::{InterpolateOptions, Value};
/// use kinema_core::value::MotionCell;
///
/// let x = MotionCell::new(0.0);
/// let opacity = derive_range(
///     &x,
///     &[-200.0, -100.0, 100.0, 200.0],
///     &[Value::from(0), Value::from(1), Value::from(1), Value::from(0)],
///     &InterpolateOptions::default(),
/// )
/// .unwrap();
///
/// x.set(150.0);
/// assert_eq!(opacity.get(), Value::Number(0.5));
/// ```
pub fn derive_range(
    source: &MotionCell<f64>,
    input: &[f64],
    output: &[Value],
    options: &InterpolateOptions,
) -> Result<Derivation<Value>> {
    let fingerprint = Fingerprint::of_range(input, output, options)?;
    let interpolator = Interpolator::compile(input, output, options)?;
    Ok(bind_interpolator(source, Arc::new(interpolator), fingerprint))
}

/// Bind an already compiled interpolator to a source.
pub(crate) fn bind_interpolator(
    source: &MotionCell<f64>,
    interpolator: Arc<Interpolator>,
    fingerprint: Fingerprint,
) -> Derivation<Value> {
    let output = MotionCell::new(interpolator.map(source.get()));

    let subscription = {
        let handle = source.downgrade();
        let interpolator = Arc::clone(&interpolator);
        let output = output.clone();
        source.on_change(move |_| {
            if let Some(source) = handle.upgrade() {
                output.set(interpolator.map(source.get()));
            }
        })
    };

    Derivation::new(
        output,
        smallvec::smallvec![source.id()],
        smallvec::smallvec![subscription],
        Some(interpolator),
        Some(fingerprint),
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotionError;
    use std::sync::atomic::AtomicI32;

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn map_seeds_output_on_construction() {
        let x = MotionCell::new(3);
        let squared = derive_map(&x, |v| v * v);

        assert_eq!(squared.get(), 9);
        assert_eq!(squared.sources(), &[x.id()]);
        assert!(squared.fingerprint().is_none());
    }

    #[test]
    fn map_recomputes_on_every_source_change() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let x = MotionCell::new(1);
        let label = derive_map(&x, move |v| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            format!("#{v}")
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        x.set(2);
        x.set(2);
        assert_eq!(label.get(), "#2");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn direct_reads_every_source_in_order() {
        let a = MotionCell::new(10.0);
        let b = MotionCell::new(4.0);
        let difference = derive_direct(&[a.clone(), b.clone()], |v| v[0] - v[1]);
        assert_eq!(difference.get(), 6.0);

        a.set(20.0);
        assert_eq!(difference.get(), 16.0);

        b.set(25.0);
        assert_eq!(difference.get(), -5.0);
        assert_eq!(difference.sources(), &[a.id(), b.id()]);
    }

    #[test]
    fn direct_with_no_sources_is_constant() {
        let sources: [MotionCell<f64>; 0] = [];
        let constant = derive_direct(&sources, |v| v.len());
        assert_eq!(constant.get(), 0);
    }

    #[test]
    fn derivation_does_not_keep_sources_alive() {
        let a = MotionCell::new(1);
        let b = MotionCell::new(2);
        let sum = derive_direct(&[a.clone(), b.clone()], |v| v.iter().sum::<i32>());

        let weak_b = b.downgrade();
        drop(b);
        assert!(weak_b.upgrade().is_none());

        // `b` is gone, so the transform cannot run; the last value stays.
        a.set(5);
        assert_eq!(sum.get(), 3);
    }

    #[test]
    fn output_notifies_its_own_listeners() {
        let x = MotionCell::new(0.0);
        let half = derive_map(&x, |v| v / 2.0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = half.on_change(move |v| seen_clone.lock().push(*v));

        x.set(4.0);
        x.set(8.0);
        assert_eq!(*seen.lock(), vec![2.0, 4.0]);
    }

    #[test]
    fn stop_detaches_from_sources() {
        let x = MotionCell::new(1.0);
        let derived = derive_map(&x, |v| v + 1.0);
        let _sub = derived.on_change(|_| {});
        assert_eq!(x.subscriber_count(), 1);

        derived.stop();
        derived.stop();

        assert!(derived.is_stopped());
        assert_eq!(x.subscriber_count(), 0);
        assert_eq!(derived.cell().subscriber_count(), 0);

        x.set(10.0);
        assert_eq!(derived.get(), 2.0);
    }

    #[test]
    fn dropping_last_handle_tears_down() {
        let x = MotionCell::new(1.0);
        let derived = derive_map(&x, |v| v * 3.0);
        let other = derived.clone();
        assert!(derived.ptr_eq(&other));

        drop(derived);
        assert_eq!(x.subscriber_count(), 1);

        drop(other);
        assert_eq!(x.subscriber_count(), 0);
    }

    #[test]
    fn range_maps_source_through_interpolator() {
        let x = MotionCell::new(-200.0);
        let opacity = derive_range(
            &x,
            &[-200.0, -100.0, 100.0, 200.0],
            &numbers(&[0.0, 1.0, 1.0, 0.0]),
            &InterpolateOptions::default(),
        )
        .unwrap();
        assert_eq!(opacity.get(), Value::Number(0.0));

        x.set(-150.0);
        assert_eq!(opacity.get(), Value::Number(0.5));

        x.set(0.0);
        assert_eq!(opacity.get(), Value::Number(1.0));

        x.set(300.0);
        assert_eq!(opacity.get(), Value::Number(0.0));

        assert!(opacity.fingerprint().is_some());
        assert!(opacity.interpolator().is_some());
    }

    #[test]
    fn range_follows_source_through_reentrant_sets() {
        let x = MotionCell::new(0.0);
        let handle = x.clone();
        // Attached ahead of the derivation, so it runs first in every pass.
        let _bump = x.on_change(move |v| {
            if *v < 3.0 {
                handle.set(v + 1.0);
            }
        });

        let derived = derive_range(
            &x,
            &[0.0, 10.0],
            &numbers(&[0.0, 10.0]),
            &InterpolateOptions::default(),
        )
        .unwrap();

        x.set(0.0);
        assert_eq!(x.get(), 3.0);
        assert_eq!(derived.get(), Value::Number(3.0));
    }

    #[test]
    fn map_follows_source_through_reentrant_sets() {
        let x = MotionCell::new(0);
        let handle = x.clone();
        let _bump = x.on_change(move |v| {
            if *v < 5 {
                handle.set(v + 1);
            }
        });

        let label = derive_map(&x, |v| format!("step {v}"));

        x.set(1);
        assert_eq!(x.get(), 5);
        assert_eq!(label.get(), "step 5");
    }

    #[test]
    fn range_errors_surface_at_construction() {
        let x = MotionCell::new(0.0);
        let err = derive_range(
            &x,
            &[0.0, 1.0, 0.5],
            &numbers(&[0.0, 1.0, 2.0]),
            &InterpolateOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, MotionError::Configuration { .. }));
        assert_eq!(x.subscriber_count(), 0);
    }
}
