//! Idle workers grouped by the task type they were loaded for.

use std::collections::{BTreeMap, VecDeque};

use super::WorkerId;

/// Idle worker contexts keyed by worker type, FIFO within a type.
///
/// Empty buckets are dropped as soon as they drain, so iteration only ever
/// sees types with at least one idle worker.
#[derive(Debug, Default)]
pub(crate) struct IdleWorkerCache {
    buckets: BTreeMap<String, VecDeque<WorkerId>>,
    len: usize,
}

impl IdleWorkerCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Park a worker at the back of its type's bucket.
    pub(crate) fn push(&mut self, worker_type: &str, worker: WorkerId) {
        self.buckets
            .entry(worker_type.to_owned())
            .or_default()
            .push_back(worker);
        self.len += 1;
    }

    /// Take the oldest idle worker of `worker_type`.
    pub(crate) fn pop(&mut self, worker_type: &str) -> Option<WorkerId> {
        let bucket = self.buckets.get_mut(worker_type)?;
        let worker = bucket.pop_front();
        if bucket.is_empty() {
            self.buckets.remove(worker_type);
        }
        if worker.is_some() {
            self.len -= 1;
        }
        worker
    }

    /// Take the head of the first non-empty bucket in iteration order.
    pub(crate) fn pop_any(&mut self) -> Option<WorkerId> {
        let worker_type = self.buckets.keys().next()?.clone();
        self.pop(&worker_type)
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn count(&self, worker_type: &str) -> usize {
        self.buckets.get(worker_type).map_or(0, VecDeque::len)
    }

    pub(crate) fn contains(&self, worker: WorkerId) -> bool {
        self.buckets.values().any(|bucket| bucket.contains(&worker))
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_is_fifo_per_type() {
        let mut cache = IdleWorkerCache::new();
        cache.push("A", 1);
        cache.push("A", 2);
        cache.push("B", 3);

        assert_eq!(cache.pop("A"), Some(1));
        assert_eq!(cache.pop("A"), Some(2));
        assert_eq!(cache.pop("A"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.count("B"), 1);
    }

    #[test]
    fn test_drained_bucket_is_dropped() {
        let mut cache = IdleWorkerCache::new();
        cache.push("A", 1);
        assert_eq!(cache.pop("A"), Some(1));
        assert!(cache.buckets.is_empty());
        assert_eq!(cache.pop("missing"), None);
    }

    #[test]
    fn test_pop_any_takes_first_bucket_head() {
        let mut cache = IdleWorkerCache::new();
        cache.push("B", 7);
        cache.push("A", 4);
        cache.push("A", 5);

        assert_eq!(cache.pop_any(), Some(4));
        assert_eq!(cache.pop_any(), Some(5));
        assert_eq!(cache.pop_any(), Some(7));
        assert_eq!(cache.pop_any(), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut cache = IdleWorkerCache::new();
        cache.push("A", 1);
        cache.push("B", 2);
        cache.clear();
        assert!(!cache.contains(1));
        assert_eq!(cache.len(), 0);
    }
}
