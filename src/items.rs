//! Item Repository - owner-scoped CRUD over the `items` table
//!
//! Every operation resolves the caller through the session store first and
//! raises [`Error::Auth`] when no session exists. Ownership is applied as a
//! query filter here and enforced again server-side by row-level access
//! control.

use crate::model::{Item, ItemInput, User};
use crate::store::{Backend, Filter, Ordering, RelationalStore, SessionStore};
use crate::{Error, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const ITEMS_TABLE: &str = "items";

pub struct ItemRepository {
    sessions: Arc<dyn SessionStore>,
    tables: Arc<dyn RelationalStore>,
}

impl ItemRepository {
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
        user.ok_or_else(|| Error::Auth("no authenticated user found".into()))
    }

    /// Create a new item owned by the current session's user.
    ///
    /// Absent optional fields are stored as explicit nulls. Returns the
    /// persisted row, including the server-assigned id and timestamp.
    pub async fn create(&self, input: &ItemInput) -> Result<Item> {
        let user = self.require_user().await?;
        debug!(owner = %user.id, name = %input.name, "creating item");

        let payload = json!({
            "user_id": user.id,
            "name": input.name,
            "category": input.category,
            "brand_or_shop": input.brand_or_shop,
            "notes": input.notes,
        });

        let row = self
            .tables
            .insert(ITEMS_TABLE, payload)
            .await
            .map_err(|e| Error::collaborator("failed to create item", e))?;
        decode("failed to create item", row)
    }

    /// All items owned by the current user, newest-created first.
    pub async fn list_mine(&self) -> Result<Vec<Item>> {
        let user = self.require_user().await?;

        let rows = self
            .tables
            .select(
                ITEMS_TABLE,
                &[Filter::eq("user_id", user.id.to_string())],
                Some(Ordering::descending("created_at")),
            )
            .await
            .map_err(|e| Error::collaborator("failed to load items", e))?;

        rows.into_iter()
            .map(|row| decode("failed to load items", row))
            .collect()
    }

    /// Delete an item by id if it belongs to the current user.
    ///
    /// The delete carries a compound {id, owner} filter; a non-existent or
    /// non-owned id matches zero rows, which the store does not report, so
    /// this succeeds silently as a no-op.
    pub async fn delete(&self, item_id: Uuid) -> Result<()> {
        let user = self.require_user().await?;
        debug!(owner = %user.id, item = %item_id, "deleting item");

        self.tables
            .delete(
                ITEMS_TABLE,
                &[
                    Filter::eq("id", item_id.to_string()),
                    Filter::eq("user_id", user.id.to_string()),
                ],
            )
            .await
            .map_err(|e| Error::collaborator("failed to delete item", e))
    }
}

/// Deserialize a store row into a typed model, wrapping decode failures
/// with the failing operation's name.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    operation: &str,
    row: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(row).map_err(|e| Error::Collaborator {
        operation: operation.into(),
        message: format!("malformed row: {e}"),
    })
}
