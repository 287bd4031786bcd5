use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One async mutex per project GUID.
///
/// A worker holds the project's guard for the whole handler run, so two
/// tasks for the same project never execute concurrently while tasks for
/// different projects proceed in parallel.
#[derive(Default, Clone)]
pub struct ProjectLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `project_guid`.
    pub async fn lock(&self, project_guid: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(project_guid.to_string())
            .or_default()
            .clone();
        let guard = mutex.lock_owned().await;
        debug!(project_guid, "project lock acquired");
        guard
    }

    /// Take the lock of `project_guid` only if nobody holds it.
    pub fn try_lock(&self, project_guid: &str) -> Option<OwnedMutexGuard<()>> {
        let mutex = self
            .locks
            .entry(project_guid.to_string())
            .or_default()
            .clone();
        mutex.try_lock_owned().ok()
    }

    /// Whether the project's lock is currently held.
    pub fn is_locked(&self, project_guid: &str) -> bool {
        self.locks
            .get(project_guid)
            .is_some_and(|m| m.try_lock().is_err())
    }

    /// Forget locks nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_project_is_exclusive() {
        let locks = ProjectLocks::new();
        let guard = locks.lock("p").await;
        assert!(locks.is_locked("p"));

        let l = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l.lock("p").await;
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_projects_do_not_block() {
        let locks = ProjectLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let locks = ProjectLocks::new();
        let guard = locks.try_lock("p").unwrap();
        assert!(locks.try_lock("p").is_none());
        assert!(locks.try_lock("q").is_some());
        drop(guard);
        assert!(locks.try_lock("p").is_some());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = ProjectLocks::new();
        let held = locks.lock("held").await;
        drop(locks.lock("idle").await);
        assert_eq!(locks.len(), 2);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_locked("held"));
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
