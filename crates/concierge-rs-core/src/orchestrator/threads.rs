//! Thread checkpoints with per-thread turn serialisation.

use crate::checkpoint::{CheckpointStore, ThreadSummary};
use crate::error::CoreError;
use concierge_rs_protocol::ConversationState;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Checkpoint access for the orchestrator.
///
/// A turn holds the thread's lock from load to save, so turns on the same
/// thread run one after another while other threads proceed independently.
#[derive(Clone)]
pub(crate) struct ThreadStore {
    store: Arc<dyn CheckpointStore>,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ThreadStore {
    pub(crate) fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive use of a thread.
    pub(crate) async fn lock(&self, thread_id: &str) -> ThreadGuard {
        let lock = self
            .locks
            .lock()
            .entry(thread_id.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        ThreadGuard {
            guard: Some(guard),
            lock,
            thread_id: thread_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Load the thread or start an empty one owned by `user_id`.
    pub(crate) fn load_or_create(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<ConversationState, CoreError> {
        match self.store.load(thread_id)? {
            Some(state) if state.user_id == user_id => {
                debug!(
                    "resumed thread (thread_id={}, messages={})",
                    thread_id,
                    state.messages.len()
                );
                Ok(state)
            }
            Some(_) => Err(CoreError::InvalidRequest(format!(
                "thread {thread_id} belongs to another user"
            ))),
            None => {
                info!("starting thread (thread_id={}, user_id={})", thread_id, user_id);
                Ok(ConversationState::new(thread_id, user_id))
            }
        }
    }

    pub(crate) fn save(&self, state: &ConversationState) -> Result<(), CoreError> {
        Ok(self.store.save(state)?)
    }

    /// Snapshot of a thread as seen by its owner.
    pub(crate) fn get(&self, user_id: &str, thread_id: &str) -> Result<ConversationState, CoreError> {
        self.store
            .load(thread_id)?
            .filter(|state| state.user_id == user_id)
            .ok_or_else(|| CoreError::UnknownThread(thread_id.to_string()))
    }

    pub(crate) fn list(&self) -> Result<Vec<ThreadSummary>, CoreError> {
        Ok(self.store.list()?)
    }

    pub(crate) async fn delete(&self, thread_id: &str) -> Result<bool, CoreError> {
        let _guard = self.lock(thread_id).await;
        Ok(self.store.delete(thread_id)?)
    }
}

/// Exclusive hold on one thread.
///
/// Releasing the last holder drops the thread's entry from the lock map;
/// entries with waiters stay, so every waiter contends on the same mutex.
pub(crate) struct ThreadGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<AsyncMutex<()>>,
    thread_id: String,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // Held by the map and this guard only.
        let idle = locks.get(&self.thread_id).is_some_and(|entry| {
            Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2
        });
        if idle {
            locks.remove(&self.thread_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadStore;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::error::CoreError;
    use concierge_rs_protocol::Message;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn store() -> ThreadStore {
        ThreadStore::new(Arc::new(InMemoryCheckpointStore::new()))
    }

    #[test]
    fn threads_are_scoped_to_their_owner() {
        let threads = store();
        let mut state = threads.load_or_create("t1", "123").expect("create");
        state.messages.push(Message::human("hi"));
        threads.save(&state).expect("save");

        assert_eq!(threads.get("123", "t1").expect("get"), state);
        assert!(matches!(
            threads.get("456", "t1"),
            Err(CoreError::UnknownThread(_))
        ));
        assert!(matches!(
            threads.load_or_create("t1", "456"),
            Err(CoreError::InvalidRequest(_))
        ));
        assert!(matches!(
            threads.get("123", "missing"),
            Err(CoreError::UnknownThread(_))
        ));
    }

    #[tokio::test]
    async fn same_thread_turns_are_serialised() {
        let threads = store();
        let guard = threads.lock("t1").await;
        let contender = {
            let threads = threads.clone();
            tokio::spawn(async move {
                let _guard = threads.lock("t1").await;
            })
        };
        let other = tokio::time::timeout(Duration::from_millis(50), threads.lock("t2")).await;
        assert!(other.is_ok());
        drop(other);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.expect("join");
        assert!(threads.locks.lock().is_empty());
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let threads = store();
        for id in ["t1", "t2", "t3"] {
            let _guard = threads.lock(id).await;
            assert!(threads.locks.lock().contains_key(id));
        }
        assert!(threads.locks.lock().is_empty());
    }

    #[tokio::test]
    async fn delete_keeps_lock_shared_with_waiters() {
        let threads = store();
        let state = threads.load_or_create("t1", "123").expect("create");
        threads.save(&state).expect("save");

        let held = threads.lock("t1").await;
        let deleter = {
            let threads = threads.clone();
            tokio::spawn(async move { threads.delete("t1").await })
        };
        let waiter = {
            let threads = threads.clone();
            tokio::spawn(async move {
                let _guard = threads.lock("t1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(deleter.await.expect("join").expect("delete"));

        // The waiter is still queued on the original mutex, so a fresh
        // locker must wait behind it instead of getting a new one.
        let fresh = threads.lock("t1").await;
        assert!(waiter.is_finished());
        drop(fresh);
        waiter.await.expect("join");
        assert!(threads.locks.lock().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let threads = store();
        let state = threads.load_or_create("t1", "123").expect("create");
        threads.save(&state).expect("save");
        assert!(threads.delete("t1").await.expect("delete"));
        assert!(!threads.delete("t1").await.expect("delete again"));
        assert_eq!(threads.list().expect("list"), Vec::new());
    }
}
