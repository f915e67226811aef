//! Usage Log Aggregator - append-only usage events and derived statistics
//!
//! Entries are never updated or deleted. Statistics are a pure view over
//! the item's rows, recomputed on demand in a single pass; there is
//! deliberately no ownership filter on reads (see DESIGN.md).

use crate::items::decode;
use crate::model::{UsageLogEntry, UsageStats, User};
use crate::store::{Backend, Filter, RelationalStore, SessionStore};
use crate::{Error, Result};
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const USAGE_LOGS_TABLE: &str = "usage_logs";

pub struct UsageLogs {
    sessions: Arc<dyn SessionStore>,
    tables: Arc<dyn RelationalStore>,
}

impl UsageLogs {
    pub fn new(backend: &Backend) -> Self {
        Self {
            sessions: backend.sessions.clone(),
            tables: backend.tables.clone(),
        }
    }

    async fn require_user(&self) -> Result<User> {
        let user = self
            .sessions
            .current_user()
            .await
            .map_err(|e| Error::collaborator("failed to resolve authenticated user", e))?;
        user.ok_or_else(|| Error::Auth("you must be signed in to log item usage".into()))
    }

    /// Record one usage event for an item, stamped with the caller's
    /// identity and the current instant.
    pub async fn log_usage(&self, item_id: Uuid, scene_tag: &str) -> Result<UsageLogEntry> {
        let user = self.require_user().await?;
        debug!(item = %item_id, scene_tag, "logging usage");

        let row = self
            .tables
            .insert(
                USAGE_LOGS_TABLE,
                json!({
                    "item_id": item_id,
                    "user_id": user.id,
                    "scene_tag": scene_tag,
                    "used_at": Utc::now(),
                }),
            )
            .await
            .map_err(|e| Error::collaborator("failed to log item usage", e))?;
        decode("failed to log item usage", row)
    }

    /// Aggregate statistics for one item: total entries, distinct users,
    /// most recent usage, and the per-scene-tag histogram.
    ///
    /// Returns zero-valued stats when no entries exist.
    pub async fn stats(&self, item_id: Uuid) -> Result<UsageStats> {
        let rows = self
            .tables
            .select(
                USAGE_LOGS_TABLE,
                &[Filter::eq("item_id", item_id.to_string())],
                None,
            )
            .await
            .map_err(|e| Error::collaborator("failed to load usage logs", e))?;

        let mut stats = UsageStats::empty(item_id);
        let mut users = HashSet::new();
        for row in rows {
            let entry: UsageLogEntry = decode("failed to load usage logs", row)?;
            stats.total_uses += 1;
            users.insert(entry.user_id);
            stats.last_used_at = stats.last_used_at.max(Some(entry.used_at));
            *stats.by_scene.entry(entry.scene_tag).or_insert(0) += 1;
        }
        stats.unique_users = users.len() as u64;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn user(email: &str) -> User {
        User { id: Uuid::new_v4(), email: Some(email.into()) }
    }

    #[tokio::test]
    async fn test_log_usage_requires_session() {
        let store = MemoryBackend::new();
        let logs = UsageLogs::new(&store.backend());

        let err = logs.log_usage(Uuid::new_v4(), "kitchen").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_log_usage_stamps_caller_and_instant() {
        let store = MemoryBackend::new();
        let caller = user("a@example.com");
        store.sign_in_as(caller.clone());
        let logs = UsageLogs::new(&store.backend());

        let item_id = Uuid::new_v4();
        let before = Utc::now();
        let entry = logs.log_usage(item_id, "kitchen").await.unwrap();

        assert_eq!(entry.item_id, item_id);
        assert_eq!(entry.user_id, caller.id);
        assert_eq!(entry.scene_tag, "kitchen");
        assert!(entry.used_at >= before);
    }

    #[tokio::test]
    async fn test_stats_with_no_entries_is_zero_valued() {
        let store = MemoryBackend::new();
        let logs = UsageLogs::new(&store.backend());

        let stats = logs.stats(Uuid::new_v4()).await.unwrap();
        assert_eq!(stats.total_uses, 0);
        assert_eq!(stats.unique_users, 0);
        assert!(stats.last_used_at.is_none());
        assert!(stats.by_scene.is_empty());
    }

    #[tokio::test]
    async fn test_stats_counts_users_and_scenes() {
        let store = MemoryBackend::new();
        let logs = UsageLogs::new(&store.backend());
        let item_id = Uuid::new_v4();

        store.sign_in_as(user("a@example.com"));
        logs.log_usage(item_id, "kitchen").await.unwrap();
        logs.log_usage(item_id, "kitchen").await.unwrap();

        store.sign_in_as(user("b@example.com"));
        let last = logs.log_usage(item_id, "office").await.unwrap();

        let stats = logs.stats(item_id).await.unwrap();
        assert_eq!(stats.total_uses, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.last_used_at, Some(last.used_at));
        assert_eq!(stats.by_scene.get("kitchen"), Some(&2));
        assert_eq!(stats.by_scene.get("office"), Some(&1));
    }

    #[tokio::test]
    async fn test_stats_ignore_other_items() {
        let store = MemoryBackend::new();
        store.sign_in_as(user("a@example.com"));
        let logs = UsageLogs::new(&store.backend());

        let item_id = Uuid::new_v4();
        logs.log_usage(item_id, "kitchen").await.unwrap();
        logs.log_usage(Uuid::new_v4(), "office").await.unwrap();

        let stats = logs.stats(item_id).await.unwrap();
        assert_eq!(stats.total_uses, 1);
    }
}
