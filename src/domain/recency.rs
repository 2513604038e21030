//! Bounded recency set guarding against repeat alerts.
//!
//! [`NotificationDeduplicator`] remembers which encounters were already
//! alerted on. The first caller for an id wins; everybody after that is told
//! not to notify. The set is capped: once it grows past its capacity, the
//! oldest inserted ids are evicted in one batch.
//!
//! The set lives in memory only. A restart forgets everything, which can
//! produce a duplicate alert for an encounter that is still live.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use super::EncounterId;

/// Default number of ids kept before eviction kicks in.
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default number of oldest ids dropped per eviction.
pub const DEFAULT_EVICT_BATCH: usize = 1_000;

#[derive(Debug, Default)]
struct RecencySet {
    members: HashSet<EncounterId>,
    order: VecDeque<EncounterId>,
}

/// Concurrency-safe, insertion-ordered, bounded set of notified encounters.
///
/// # Concurrency
///
/// [`should_notify`](Self::should_notify) performs its membership check and
/// insertion under one lock, so two scan workers racing on the same id can
/// never both receive `true`.
#[derive(Debug)]
pub struct NotificationDeduplicator {
    inner: Mutex<RecencySet>,
    capacity: usize,
    evict_batch: usize,
}

impl NotificationDeduplicator {
    /// Creates a deduplicator with the given bound and eviction batch size.
    ///
    /// An `evict_batch` of zero is treated as one so the bound still holds.
    /// `capacity` is raised to at least `evict_batch`, so an eviction never
    /// drops the id that triggered it.
    #[must_use]
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        let evict_batch = evict_batch.max(1);
        Self {
            inner: Mutex::new(RecencySet::default()),
            capacity: capacity.max(evict_batch),
            evict_batch,
        }
    }

    /// Returns `true` exactly once per encounter id (until evicted) and
    /// records it.
    pub fn should_notify(&self, id: EncounterId) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let RecencySet { members, order } = &mut *guard;
        if !members.insert(id) {
            return false;
        }
        order.push_back(id);

        if order.len() > self.capacity {
            let evicted = self.evict_batch.min(order.len());
            for old in order.drain(..evicted) {
                members.remove(&old);
            }
            tracing::debug!(evicted, remaining = order.len(), "recency set evicted");
        }
        true
    }

    /// Returns `true` if the id is currently remembered.
    #[must_use]
    pub fn contains(&self, id: EncounterId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .contains(&id)
    }

    /// Returns the number of remembered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Returns `true` if nothing has been remembered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_EVICT_BATCH)
    }
}
