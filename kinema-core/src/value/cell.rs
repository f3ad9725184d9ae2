//! Motion Cell Implementation
//!
//! A `MotionCell` is the observable value primitive. It holds the current
//! value of one semantic type and notifies its listeners whenever the value
//! is set.
//!
//! # How Cells Work
//!
//! 1. A cell is created with an initial value; it is never empty.
//!
//! 2. `set` stores the new value, records the previous value and the update
//!    timestamps, then calls every attached listener in subscription order.
//!
//! 3. Notification is synchronous. By the time `set` returns, every listener
//!    (and everything those listeners set in turn) has run.
//!
//! # Re-entrancy
//!
//! No lock is held while listeners run. The listener list is snapshotted
//! before the pass, so a listener may read the cell, set it again, attach new
//! listeners, or detach old ones. Listeners attached during a pass first run
//! on the next `set`; listeners detached during a pass are skipped for the
//! rest of it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::subscriber::{ListenerId, ListenerList, ListenerRegistry, Subscription};

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique cell ID.
fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Value plus the bookkeeping needed for rate-of-change queries.
struct CellState<T> {
    current: T,
    previous: Option<T>,
    updated_at: Option<Instant>,
    previous_updated_at: Option<Instant>,
}

/// An observable value of type T.
///
/// Cloning a cell produces another handle to the same shared state.
///
/// # Example
///
/// ```rust
/// use kinema_core::value::MotionCell;
///
/// let x = MotionCell::new(0.0);
/// let sub = x.on_change(|v| println!("x is now {v}"));
///
/// x.set(10.0);
/// assert_eq!(x.get(), 10.0);
///
/// sub.unsubscribe();
/// ```
pub struct MotionCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Unique identifier for this cell.
    id: u64,

    /// Current and previous values with their timestamps.
    state: Arc<RwLock<CellState<T>>>,

    /// Attached listeners, in subscription order.
    listeners: Arc<Mutex<ListenerList<T>>>,
}

impl<T> MotionCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: next_cell_id(),
            state: Arc::new(RwLock::new(CellState {
                current: value,
                previous: None,
                updated_at: None,
                previous_updated_at: None,
            })),
            listeners: Arc::new(Mutex::new(ListenerList::new())),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.state.read().current.clone()
    }

    /// Get the value held before the most recent `set`, if any.
    pub fn previous(&self) -> Option<T> {
        self.state.read().previous.clone()
    }

    /// When the cell was last set, if ever.
    pub fn updated_at(&self) -> Option<Instant> {
        self.state.read().updated_at
    }

    /// When the cell was set before the most recent `set`, if ever.
    pub fn previous_updated_at(&self) -> Option<Instant> {
        self.state.read().previous_updated_at
    }

    /// Set a new value and notify listeners, stamped with the current time.
    pub fn set(&self, value: T) {
        self.set_at(value, Instant::now());
    }

    /// Set a new value with an externally supplied timestamp.
    ///
    /// Frame drivers use this so every cell written in one frame shares the
    /// frame's timestamp.
    pub fn set_at(&self, value: T, at: Instant) {
        {
            let mut state = self.state.write();
            let old = std::mem::replace(&mut state.current, value.clone());
            state.previous = Some(old);
            state.previous_updated_at = state.updated_at.replace(at);
        }

        self.notify(&value);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let state = self.state.read();
            f(&state.current)
        };
        self.set(new_value);
    }

    /// Attach a listener that runs with every new value.
    ///
    /// The listener is not called with the current value; it first runs on
    /// the next `set`.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners.lock().push(id, Arc::new(listener));

        let registry: Weak<dyn ListenerRegistry> = Arc::downgrade(&self.listeners) as Weak<_>;
        Subscription::new(id, registry)
    }

    /// Detach every listener.
    ///
    /// The cell stays usable: later `set` calls still update the value but
    /// reach none of the listeners that were attached before the stop.
    pub fn stop(&self) {
        let mut listeners = self.listeners.lock();
        if listeners.len() > 0 {
            tracing::debug!(cell = self.id, listeners = listeners.len(), "cell stopped");
        }
        listeners.clear();
    }

    /// Get the number of attached listeners.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Create a non-owning handle to this cell.
    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell {
            id: self.id,
            state: Arc::downgrade(&self.state),
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Call every listener attached before this pass started.
    fn notify(&self, value: &T) {
        let snapshot = self.listeners.lock().snapshot();
        tracing::trace!(cell = self.id, listeners = snapshot.len(), "cell updated");

        for (id, listener) in snapshot {
            // Skip listeners detached by an earlier listener in this pass.
            if !self.listeners.lock().contains(id) {
                continue;
            }
            listener(value);
        }
    }
}

impl MotionCell<f64> {
    /// Rate of change between the previous and current value, in units per
    /// second.
    ///
    /// Returns `0.0` until the cell has been set twice, or when both updates
    /// share a timestamp.
    pub fn velocity(&self) -> f64 {
        let state = self.state.read();
        let (Some(previous), Some(at), Some(previous_at)) =
            (state.previous, state.updated_at, state.previous_updated_at)
        else {
            return 0.0;
        };

        let elapsed = at.saturating_duration_since(previous_at).as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        (state.current - previous) / elapsed
    }
}

impl<T> Clone for MotionCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: Arc::clone(&self.state),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> Debug for MotionCell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionCell")
            .field("id", &self.id)
            .field("value", &self.get())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a new cell with the given initial value.
pub fn cell<T>(value: T) -> MotionCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    MotionCell::new(value)
}

/// Non-owning handle to a [`MotionCell`].
///
/// Derivation bindings hold their sources through this so that a source's
/// listener list never keeps the source itself alive.
pub struct WeakCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    state: Weak<RwLock<CellState<T>>>,
    listeners: Weak<Mutex<ListenerList<T>>>,
}

impl<T> WeakCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the ID of the cell this handle points to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Recover a full handle if the cell is still alive.
    pub fn upgrade(&self) -> Option<MotionCell<T>> {
        Some(MotionCell {
            id: self.id,
            state: self.state.upgrade()?,
            listeners: self.listeners.upgrade()?,
        })
    }
}

impl<T> Clone for WeakCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: Weak::clone(&self.state),
            listeners: Weak::clone(&self.listeners),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    #[test]
    fn cell_get_and_set() {
        let cell = MotionCell::new(0);
        assert_eq!(cell.get(), 0);

        cell.set(42);
        assert_eq!(cell.get(), 42);
        assert_eq!(cell.previous(), Some(0));
    }

    #[test]
    fn cell_update() {
        let cell = MotionCell::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn cell_notifies_listeners_with_new_value() {
        let cell = MotionCell::new(0);
        let last_seen = Arc::new(AtomicI32::new(-1));
        let last_seen_clone = last_seen.clone();

        let _sub = cell.on_change(move |v| {
            last_seen_clone.store(*v, Ordering::SeqCst);
        });

        // Attaching does not fire
        assert_eq!(last_seen.load(Ordering::SeqCst), -1);

        cell.set(7);
        assert_eq!(last_seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let cell = MotionCell::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            let _ = cell.on_change(move |_| order.lock().push(tag));
        }

        cell.set(1);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_detaches_exactly_one_listener() {
        let cell = MotionCell::new(0);
        let a = Arc::new(AtomicI32::new(0));
        let b = Arc::new(AtomicI32::new(0));

        let a_clone = a.clone();
        let sub_a = cell.on_change(move |_| {
            a_clone.fetch_add(1, Ordering::SeqCst);
        });
        let b_clone = b.clone();
        let _sub_b = cell.on_change(move |_| {
            b_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        assert!(sub_a.unsubscribe());
        // Second detach is a no-op
        assert!(!sub_a.unsubscribe());

        cell.set(2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_added_during_set_waits_for_next_set() {
        let cell = MotionCell::new(0);
        let late_calls = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let late_calls_clone = late_calls.clone();
        let _sub = cell.on_change(move |_| {
            let late_calls = late_calls_clone.clone();
            let _ = cell_clone.on_change(move |_| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            });
        });

        cell.set(1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        cell.set(2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_detached_mid_pass_is_skipped() {
        let cell = MotionCell::new(0);
        let second_calls = Arc::new(AtomicI32::new(0));

        let second_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = second_slot.clone();
        let _first = cell.on_change(move |_| {
            if let Some(sub) = slot_clone.lock().as_ref() {
                sub.unsubscribe();
            }
        });

        let second_calls_clone = second_calls.clone();
        let second = cell.on_change(move |_| {
            second_calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        *second_slot.lock() = Some(second);

        cell.set(1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_clears_listeners_but_keeps_value_writable() {
        let cell = MotionCell::new(0);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let _sub = cell.on_change(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.stop();
        assert_eq!(cell.subscriber_count(), 0);

        cell.set(5);
        assert_eq!(cell.get(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reentrant_set_from_listener_does_not_deadlock() {
        let cell = MotionCell::new(0);
        let cell_clone = cell.clone();

        let _sub = cell.on_change(move |v| {
            if *v < 3 {
                cell_clone.set(v + 1);
            }
        });

        cell.set(0);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn velocity_uses_recorded_timestamps() {
        let cell = MotionCell::new(0.0);
        assert_eq!(cell.velocity(), 0.0);

        let start = Instant::now();
        cell.set_at(10.0, start);
        cell.set_at(30.0, start + Duration::from_millis(500));

        assert!((cell.velocity() - 40.0).abs() < 1e-9);
        assert_eq!(cell.previous_updated_at(), Some(start));
    }

    #[test]
    fn velocity_is_zero_for_same_frame_updates() {
        let cell = MotionCell::new(0.0);
        let now = Instant::now();
        cell.set_at(1.0, now);
        cell.set_at(2.0, now);
        assert_eq!(cell.velocity(), 0.0);
    }

    #[test]
    fn clone_shares_state() {
        let cell1 = MotionCell::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);
        assert_eq!(cell1.id(), cell2.id());
    }

    #[test]
    fn weak_cell_does_not_keep_cell_alive() {
        let cell = MotionCell::new(1);
        let weak = cell.downgrade();
        assert_eq!(weak.upgrade().map(|c| c.get()), Some(1));

        drop(cell);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn cell_ids_are_unique() {
        let c1 = MotionCell::new(0);
        let c2 = MotionCell::new(0);
        assert_ne!(c1.id(), c2.id());
    }
}
