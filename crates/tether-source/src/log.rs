//! Bounded log of applied transform ids.
//!
//! Membership gives sources their idempotence guarantee: a transform id
//! seen before is skipped on re-submission. The log evicts oldest-first so
//! a long-running process holds a bounded set.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tether_core::TransformId;

/// Default maximum number of retained transform ids.
pub const DEFAULT_LOG_LIMIT: usize = 1000;

/// FIFO-bounded set of applied transform ids.
#[derive(Debug)]
pub struct TransformLog {
    inner: Mutex<LogInner>,
}

#[derive(Debug)]
struct LogInner {
    set: HashSet<TransformId>,
    order: VecDeque<TransformId>,
    limit: usize,
}

impl TransformLog {
    /// Create a log retaining at most `limit` ids.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                set: HashSet::new(),
                order: VecDeque::new(),
                limit,
            }),
        }
    }

    /// Whether an id has been recorded (and not yet evicted).
    pub fn contains(&self, id: &TransformId) -> bool {
        self.inner.lock().unwrap().set.contains(id)
    }

    /// Record an id. Returns `false` if it was already present.
    pub fn insert(&self, id: TransformId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.set.insert(id) {
            return false;
        }
        inner.order.push_back(id);
        while inner.order.len() > inner.limit {
            if let Some(evicted) = inner.order.pop_front() {
                inner.set.remove(&evicted);
            }
        }
        true
    }

    /// Number of retained ids.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every retained id.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.set.clear();
        inner.order.clear();
    }
}

impl Default for TransformLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let log = TransformLog::default();
        let id = TransformId::random();
        assert!(!log.contains(&id));
        assert!(log.insert(id));
        assert!(log.contains(&id));
        assert!(!log.insert(id));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn oldest_ids_are_evicted_at_the_limit() {
        let log = TransformLog::new(2);
        let first = TransformId::random();
        let second = TransformId::random();
        let third = TransformId::random();

        log.insert(first);
        log.insert(second);
        log.insert(third);

        assert_eq!(log.len(), 2);
        assert!(!log.contains(&first));
        assert!(log.contains(&second));
        assert!(log.contains(&third));
    }

    #[test]
    fn clear_empties_the_log() {
        let log = TransformLog::default();
        log.insert(TransformId::random());
        log.clear();
        assert!(log.is_empty());
    }
}
