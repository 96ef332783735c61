//! # Session store
//!
//! Volatile mapping from user id to [`ConversationState`] with a retention window.
//!
//! - Entries expire `ttl` after their last [`SessionStore::put`]; expired entries read as absent
//!   and are removed lazily or by [`SessionStore::purge_expired`].
//! - [`SessionStore::clear`] removes an entry immediately.
//! - [`SessionStore::lock`] hands out a per-user turn lane. Holding it across a whole turn
//!   (lookup, resolver call, flow, commit) serializes turns of one user while other users run
//!   in parallel.
//!
//! Data is lost on restart and never shared between processes.
//!
//! ## Thread Safety
//!
//! Both maps are `DashMap`s; a lane is an `Arc<tokio::sync::Mutex<()>>`, which is FIFO fair, so
//! queued turns of one user run in arrival order.

use dashmap::DashMap;
use dflow_core::ConversationState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default retention of a conversation after its last turn.
pub const DEFAULT_RETENTION: Duration = Duration::from_millis(60_000);

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Held for the duration of one user's turn.
pub type TurnGuard = OwnedMutexGuard<()>;

#[derive(Debug, Clone)]
struct Entry {
    state: ConversationState,
    expires_at: Instant,
}

/// Time-expiring per-user conversation store.
#[derive(Debug)]
pub struct SessionStore {
    entries: DashMap<String, Entry>,
    lanes: DashMap<String, Arc<Mutex<()>>>,
    retention: Duration,
}

impl SessionStore {
    /// Creates an empty store whose [`commit`](Self::commit) uses `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            lanes: DashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Returns the live state for `user_id`, or `None` if absent or expired.
    pub fn get(&self, user_id: &str) -> Option<ConversationState> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(user_id) {
            if entry.expires_at > now {
                return Some(entry.state.clone());
            }
        } else {
            return None;
        }
        // The shard guard above is released before touching the map again.
        self.entries.remove_if(user_id, |_, e| e.expires_at <= now);
        debug!(user_id = %user_id, "Session expired");
        None
    }

    /// Stores `state` for `user_id`, replacing any previous entry and resetting its expiry.
    pub fn put(&self, user_id: &str, state: ConversationState, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(user_id.to_string(), Entry { state, expires_at });
    }

    /// [`put`](Self::put) with the store's retention.
    pub fn commit(&self, user_id: &str, state: ConversationState) {
        self.put(user_id, state, self.retention);
    }

    /// Removes the entry for `user_id` immediately.
    pub fn clear(&self, user_id: &str) {
        if self.entries.remove(user_id).is_some() {
            debug!(user_id = %user_id, "Session cleared");
        }
    }

    /// Waits for and takes the turn lane of `user_id`.
    pub async fn lock(&self, user_id: &str) -> TurnGuard {
        let lane = self
            .lanes
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lane.lock_owned().await
    }

    /// Drops expired entries and lanes nobody holds. Returns the number of sessions removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        // A lane referenced only by the map has no turn running or waiting.
        self.lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a task that calls [`purge_expired`](Self::purge_expired) every `interval`
    /// (at least one millisecond).
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    info!(removed, remaining = store.entries.len(), "Purged expired sessions");
                }
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
