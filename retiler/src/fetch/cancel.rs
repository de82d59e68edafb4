//! Grouped cooperative cancellation for in-flight retrievals.
//!
//! Every retrieval registers a [`CancellationToken`] under a caller-supplied
//! task id. Cancelling the task id cancels every outstanding token in that
//! group at once; retrievals belonging to other task ids are untouched.
//!
//! Registration hands back a [`TokenGuard`] whose drop removes the token
//! from its group again, so a group only ever holds tokens for calls that
//! have not settled yet. Empty groups are deleted eagerly.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry of cancellation groups, keyed by task id.
///
/// Owned explicitly by the fetch layer and injected where needed, so tests
/// can run isolated instances side by side.
#[derive(Default)]
pub struct CancellationRegistry {
    groups: DashMap<String, HashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token under `task_id`.
    ///
    /// The returned guard keeps the registration alive; dropping it removes
    /// the token from the group and deletes the group once empty.
    pub fn register(self: &Arc<Self>, task_id: &str) -> TokenGuard {
        let entry_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.groups
            .entry(task_id.to_string())
            .or_default()
            .insert(entry_id, token.clone());
        TokenGuard {
            registry: Arc::clone(self),
            task_id: task_id.to_string(),
            entry_id,
            token,
        }
    }

    /// Cancels every outstanding token registered under `task_id` and
    /// deletes the group.
    ///
    /// # Returns
    ///
    /// The number of tokens cancelled. Zero when the group does not exist,
    /// which is not an error.
    pub fn cancel_task(&self, task_id: &str) -> usize {
        match self.groups.remove(task_id) {
            Some((_, group)) => {
                for token in group.values() {
                    token.cancel();
                }
                debug!(task_id, cancelled = group.len(), "task group cancelled");
                group.len()
            }
            None => 0,
        }
    }

    /// Number of tokens currently registered under `task_id`.
    pub fn group_len(&self, task_id: &str) -> usize {
        self.groups.get(task_id).map(|g| g.len()).unwrap_or(0)
    }

    /// Number of task groups with at least one outstanding token.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// RAII registration of one retrieval's token in its task group.
pub struct TokenGuard {
    registry: Arc<CancellationRegistry>,
    task_id: String,
    entry_id: u64,
    token: CancellationToken,
}

impl TokenGuard {
    /// The token this registration refers to.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        // The group may already be gone if cancel_task removed it wholesale.
        let now_empty = match self.registry.groups.get_mut(&self.task_id) {
            Some(mut group) => {
                group.remove(&self.entry_id);
                group.is_empty()
            }
            None => return,
        };
        if now_empty {
            // Re-checked under the shard lock; a concurrent register wins.
            self.registry
                .groups
                .remove_if(&self.task_id, |_, group| group.is_empty());
        }
    }
}
