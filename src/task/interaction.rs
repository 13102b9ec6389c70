//! Human-in-the-loop bookkeeping and its time-bounded cleanup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatState;

/// Tracks which threads have outstanding approval requests.
#[async_trait]
pub trait HumanLoopRegistry: Send + Sync {
    /// Record an approval request raised by `thread_id`.
    async fn register(&self, thread_id: &str, approval_id: &str);

    /// Drop everything recorded for a thread.
    async fn clear_thread(&self, thread_id: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryHumanLoopRegistry {
    approvals: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryHumanLoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approvals(&self, thread_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .approvals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(thread_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn has_thread(&self, thread_id: &str) -> bool {
        self.approvals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(thread_id)
    }
}

#[async_trait]
impl HumanLoopRegistry for InMemoryHumanLoopRegistry {
    async fn register(&self, thread_id: &str, approval_id: &str) {
        self.approvals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(thread_id.to_string())
            .or_default()
            .insert(approval_id.to_string());
    }

    async fn clear_thread(&self, thread_id: &str) {
        self.approvals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(thread_id);
    }
}

/// How a scheduled cleanup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// The interaction was resolved before the delay elapsed.
    Resolved,
    /// The delay elapsed.
    TimedOut,
}

/// Schedules per-thread cleanup of human-interaction state.
///
/// Each thread gets a cancellation token; resolving the thread fires the
/// cleanup immediately, otherwise it runs once the delay elapses.
pub struct InteractionTracker {
    registry: Arc<dyn HumanLoopRegistry>,
    chats: Arc<ChatState>,
    pending: Arc<Mutex<HashMap<String, ScheduledCleanup>>>,
    next_generation: AtomicU64,
}

struct ScheduledCleanup {
    generation: u64,
    token: CancellationToken,
}

impl InteractionTracker {
    pub fn new(registry: Arc<dyn HumanLoopRegistry>, chats: Arc<ChatState>) -> Self {
        Self {
            registry,
            chats,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<dyn HumanLoopRegistry> {
        &self.registry
    }

    /// Schedule cleanup of `thread_id` after `delay`.
    ///
    /// Re-scheduling a thread replaces the earlier timer; the replaced timer
    /// exits without cleaning up.
    pub fn schedule_cleanup(
        &self,
        chat_id: &str,
        thread_id: &str,
        delay: Duration,
    ) -> JoinHandle<Option<CleanupReason>> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                thread_id.to_string(),
                ScheduledCleanup {
                    generation,
                    token: token.clone(),
                },
            );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let registry = Arc::clone(&self.registry);
        let chats = Arc::clone(&self.chats);
        let pending = Arc::clone(&self.pending);
        let chat_id = chat_id.to_string();
        let thread_id = thread_id.to_string();

        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = token.cancelled() => CleanupReason::Resolved,
                _ = tokio::time::sleep(delay) => CleanupReason::TimedOut,
            };

            {
                let mut map = pending.lock().unwrap_or_else(|e| e.into_inner());
                match map.get(&thread_id) {
                    // Superseded by a newer schedule.
                    Some(entry) if entry.generation != generation => return None,
                    Some(_) => {
                        map.remove(&thread_id);
                    }
                    // Already removed by `resolve`.
                    None => {}
                }
            }

            registry.clear_thread(&thread_id).await;
            chats.clear_pending_interaction(&chat_id, &thread_id).await;
            tracing::debug!(thread_id = %thread_id, reason = ?reason, "Cleaned up human interaction state");
            Some(reason)
        })
    }

    /// Resolve a thread now. Returns false if no cleanup was scheduled.
    pub fn resolve(&self, thread_id: &str) -> bool {
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(thread_id);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, thread_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (InteractionTracker, Arc<InMemoryHumanLoopRegistry>, Arc<ChatState>) {
        let registry = Arc::new(InMemoryHumanLoopRegistry::new());
        let chats = Arc::new(ChatState::new());
        let tracker = InteractionTracker::new(registry.clone(), chats.clone());
        (tracker, registry, chats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_after_delay() {
        let (tracker, registry, chats) = tracker();
        registry.register("t1", "ap-1").await;
        chats.set_pending_interaction("c", "t1").await;

        let handle = tracker.schedule_cleanup("c", "t1", Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(registry.has_thread("t1"));

        assert_eq!(handle.await.unwrap(), Some(CleanupReason::TimedOut));
        assert!(!registry.has_thread("t1"));
        assert!(chats.pending_interaction("c").await.is_none());
        assert!(!tracker.is_scheduled("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_cleans_up_early() {
        let (tracker, registry, _chats) = tracker();
        registry.register("t1", "ap-1").await;

        let handle = tracker.schedule_cleanup("c", "t1", Duration::from_secs(30));
        assert!(tracker.resolve("t1"));
        assert_eq!(handle.await.unwrap(), Some(CleanupReason::Resolved));
        assert!(!registry.has_thread("t1"));
        assert!(!tracker.resolve("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes_earlier_timer() {
        let (tracker, registry, _chats) = tracker();
        registry.register("t1", "ap-1").await;

        let first = tracker.schedule_cleanup("c", "t1", Duration::from_secs(30));
        let second = tracker.schedule_cleanup("c", "t1", Duration::from_secs(60));
        assert_eq!(first.await.unwrap(), None);
        assert!(registry.has_thread("t1"));

        assert_eq!(second.await.unwrap(), Some(CleanupReason::TimedOut));
        assert!(!registry.has_thread("t1"));
    }
}
