//! Row models for the hosted tables
//!
//! Field names match the backend columns exactly:
//! - items(id, user_id, name, category, brand_or_shop, notes, created_at)
//! - item_photos(id, item_id, image_url, created_at)
//! - usage_logs(id, item_id, user_id, scene_tag, used_at, created_at)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A user-owned inventory record.
///
/// Items are created on behalf of the current session's user and are
/// visible/mutable only by their owner. There is no in-place update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Uuid,
    /// Identity of the creating user; every item has exactly one owner.
    pub user_id: Uuid,
    pub name: String,
    pub category: String,
    pub brand_or_shop: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating an [`Item`].
///
/// Absent optional fields are persisted as explicit nulls, not omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub category: String,
    pub brand_or_shop: Option<String>,
    pub notes: Option<String>,
}

/// A stored image reference associated with an [`Item`].
///
/// The blob and this row form a single logical unit: the uploader removes
/// the blob again if the row insert fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemPhoto {
    pub id: i64,
    pub item_id: Uuid,
    /// Resolved public URL of the stored blob.
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// An append-only record of one usage event for an [`Item`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageLogEntry {
    pub id: i64,
    pub item_id: Uuid,
    pub user_id: Uuid,
    /// Free-text label categorizing the usage event.
    pub scene_tag: String,
    pub used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate usage statistics for one item.
///
/// A pure view recomputed on demand from `usage_logs` rows; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub item_id: Uuid,
    pub total_uses: u64,
    pub unique_users: u64,
    /// Most recent `used_at` among the item's entries, absent when none exist.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Entry count per distinct scene tag.
    pub by_scene: HashMap<String, u64>,
}

impl UsageStats {
    /// Zero-valued stats for an item with no usage entries.
    pub fn empty(item_id: Uuid) -> Self {
        Self {
            item_id,
            total_uses: 0,
            unique_users: 0,
            last_used_at: None,
            by_scene: HashMap::new(),
        }
    }
}

/// The authenticated identity behind a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
}

/// An authenticated session, including the token material needed to
/// authorize subsequent requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub user: User,
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_row_roundtrip() {
        let item = Item {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "cast iron pan".into(),
            category: "kitchen".into(),
            brand_or_shop: None,
            notes: Some("seasoned 2024".into()),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("brand_or_shop").unwrap().is_null());
        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_empty_stats() {
        let id = Uuid::new_v4();
        let stats = UsageStats::empty(id);
        assert_eq!(stats.total_uses, 0);
        assert_eq!(stats.unique_users, 0);
        assert!(stats.last_used_at.is_none());
        assert!(stats.by_scene.is_empty());
    }
}
