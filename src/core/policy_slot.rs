//! Single-slot policy handoff between the learner and collector workers.
//!
//! The learner publishes a fresh inference snapshot of the policy after
//! every optimizer step; each collector worker owns one slot and swaps the
//! snapshot into its local copy between ticks. New publications overwrite
//! a pending one, so a slot never accumulates stale models and a slow
//! worker always picks up the newest weights.
//!
//! Burn models are `Send` but not `Sync` (`Param` holds lazily-initialized
//! state), which is why workers hold local copies instead of sharing one
//! policy reference.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Swap cell holding at most one pending policy snapshot.
pub struct PolicySlot<P> {
    pending: Mutex<Option<P>>,
    version: AtomicU64,
}

impl<P> PolicySlot<P> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Create a slot already holding a snapshot.
    pub fn with_initial(policy: P) -> Self {
        Self {
            pending: Mutex::new(Some(policy)),
            version: AtomicU64::new(1),
        }
    }

    /// Version of the most recently published snapshot.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether a snapshot is waiting to be taken.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl<P: Send> PolicySlot<P> {
    /// Publish a snapshot, overwriting any pending one.
    ///
    /// Returns `true` when a pending snapshot was dropped.
    pub fn publish(&self, policy: P) -> bool {
        let mut guard = self.pending.lock();
        let overwrote = guard.is_some();
        *guard = Some(policy);
        self.version.fetch_add(1, Ordering::Release);
        overwrote
    }

    /// Take the pending snapshot, leaving the slot empty.
    pub fn take(&self) -> Option<P> {
        self.pending.lock().take()
    }
}

impl<P> Default for PolicySlot<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a policy slot.
pub type SharedPolicySlot<P> = Arc<PolicySlot<P>>;

/// Fan-out publisher: one slot per registered collector worker.
///
/// The learner publishes once; every worker's slot receives its own clone
/// of the snapshot, so no worker can starve another by taking first.
/// Workers registered after a publication start from the latest snapshot.
pub struct PolicyPublisher<P> {
    slots: Mutex<Vec<SharedPolicySlot<P>>>,
    latest: Mutex<Option<P>>,
}

impl<P> PolicyPublisher<P> {
    /// Create a publisher with no registered workers.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            latest: Mutex::new(None),
        }
    }

    /// Number of registered workers.
    pub fn worker_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<P: Clone + Send> PolicyPublisher<P> {
    /// Register a new worker, returning its private slot seeded with the
    /// latest published snapshot, if any.
    pub fn register(&self) -> SharedPolicySlot<P> {
        let slot = match self.latest.lock().as_ref() {
            Some(policy) => Arc::new(PolicySlot::with_initial(policy.clone())),
            None => Arc::new(PolicySlot::new()),
        };
        self.slots.lock().push(Arc::clone(&slot));
        slot
    }

    /// Publish a snapshot to every registered worker.
    pub fn publish(&self, policy: &P) {
        *self.latest.lock() = Some(policy.clone());
        for slot in self.slots.lock().iter() {
            slot.publish(policy.clone());
        }
    }
}

impl<P> Default for PolicyPublisher<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_take() {
        let slot = PolicySlot::new();
        assert!(slot.take().is_none());
        assert_eq!(slot.version(), 0);

        slot.publish(7u32);
        assert!(slot.has_pending());
        assert_eq!(slot.version(), 1);

        assert_eq!(slot.take(), Some(7));
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_publish_overwrites_pending() {
        let slot = PolicySlot::new();
        assert!(!slot.publish(1u32));
        assert!(slot.publish(2u32));
        assert!(slot.publish(3u32));

        assert_eq!(slot.version(), 3);
        assert_eq!(slot.take(), Some(3));
    }

    #[test]
    fn test_with_initial() {
        let slot = PolicySlot::with_initial(9u32);
        assert_eq!(slot.version(), 1);
        assert_eq!(slot.take(), Some(9));
    }

    #[test]
    fn test_publisher_fans_out() {
        let publisher: PolicyPublisher<u32> = PolicyPublisher::new();
        let a = publisher.register();
        let b = publisher.register();
        assert_eq!(publisher.worker_count(), 2);

        publisher.publish(&5);
        assert_eq!(a.take(), Some(5));
        assert_eq!(b.take(), Some(5));
    }

    #[test]
    fn test_late_registration_seeds_latest() {
        let publisher: PolicyPublisher<u32> = PolicyPublisher::new();
        publisher.publish(&3);

        let late = publisher.register();
        assert_eq!(late.take(), Some(3));
    }

    #[test]
    fn test_shared_across_threads() {
        let slot: SharedPolicySlot<u32> = Arc::new(PolicySlot::new());
        let publisher = Arc::clone(&slot);

        let handle = std::thread::spawn(move || {
            publisher.publish(42);
        });
        handle.join().unwrap();

        assert_eq!(slot.take(), Some(42));
    }
}
