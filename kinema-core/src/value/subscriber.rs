//! Listener bookkeeping for observable cells.
//!
//! A listener is any callback attached to a cell: rendering glue, a
//! derivation binding, or a test counter. Each attachment gets a unique
//! [`ListenerId`] and hands back a [`Subscription`] that can detach exactly
//! that listener later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Unique identifier for an attached listener.
///
/// Ids are process-wide so a subscription can never detach a listener it
/// did not create, even after the original one is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked with a cell's new value.
pub type Listener<T> = std::sync::Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered listener list owned by a cell.
pub(crate) struct ListenerList<T> {
    entries: SmallVec<[(ListenerId, Listener<T>); 4]>,
}

impl<T> ListenerList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }

    pub(crate) fn push(&mut self, id: ListenerId, listener: Listener<T>) {
        self.entries.push((id, listener));
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clone out the current listeners so they can run without the lock.
    pub(crate) fn snapshot(&self) -> SmallVec<[(ListenerId, Listener<T>); 4]> {
        self.entries
            .iter()
            .map(|(id, listener)| (*id, std::sync::Arc::clone(listener)))
            .collect()
    }
}

/// Type-erased view of a listener list, so a [`Subscription`] does not
/// carry the cell's value type.
pub(crate) trait ListenerRegistry: Send + Sync {
    fn detach(&self, id: ListenerId) -> bool;
}

impl<T: 'static> ListenerRegistry for Mutex<ListenerList<T>> {
    fn detach(&self, id: ListenerId) -> bool {
        self.lock().remove(id)
    }
}

/// Capability to detach one listener from one cell.
///
/// Dropping a subscription does not detach the listener; call
/// [`Subscription::unsubscribe`]. Unsubscribing twice is a no-op, as is
/// unsubscribing after the cell itself is gone.
pub struct Subscription {
    id: ListenerId,
    registry: Weak<dyn ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: Weak<dyn ListenerRegistry>) -> Self {
        Self { id, registry }
    }

    /// Get the id of the listener this subscription controls.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Detach the listener. Returns `true` if it was still attached.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.detach(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cell_alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}
