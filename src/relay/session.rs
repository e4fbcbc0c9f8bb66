//! Per-user conversation tracking.
//!
//! A user has at most one outstanding question. Admission is a single
//! atomic insert into a concurrent set; the entry is removed when the
//! returned [`SessionGuard`] is dropped, whichever way the task ends.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

#[derive(Clone, Default)]
pub struct SessionTracker {
    active: Arc<DashSet<i64>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `user_id` as chatting. Returns `None` if they already are.
    pub fn try_acquire(&self, user_id: i64) -> Option<SessionGuard> {
        if self.active.insert(user_id) {
            debug!(user_id, "session opened");
            Some(SessionGuard {
                active: self.active.clone(),
                user_id,
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn is_active(&self, user_id: i64) -> bool {
        self.active.contains(&user_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Holds a user's session open until dropped.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<DashSet<i64>>,
    user_id: i64,
}

impl SessionGuard {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.remove(&self.user_id);
        debug!(user_id = self.user_id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_exclusive_per_user() {
        let tracker = SessionTracker::new();
        let guard = tracker.try_acquire(1).unwrap();
        assert!(tracker.try_acquire(1).is_none());
        assert!(tracker.try_acquire(2).is_some());
        assert!(tracker.is_active(1));
        assert_eq!(guard.user_id(), 1);
    }

    #[test]
    fn drop_releases() {
        let tracker = SessionTracker::new();
        let guard = tracker.try_acquire(1).unwrap();
        drop(guard);
        assert!(!tracker.is_active(1));
        assert!(tracker.is_empty());
        assert!(tracker.try_acquire(1).is_some());
    }

    #[tokio::test]
    async fn concurrent_acquire_admits_once() {
        let tracker = SessionTracker::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move { tracker.try_acquire(42) }));
        }

        let mut winners = Vec::new();
        for h in handles {
            if let Some(guard) = h.await.unwrap() {
                winners.push(guard);
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(tracker.len(), 1);
    }
}
