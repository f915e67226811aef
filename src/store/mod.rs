//! Store Layer - collaborator contracts
//!
//! Everything durable or authoritative lives behind one of three contracts,
//! all fulfilled by the hosted backend:
//! - [`SessionStore`]: session issuance, credential sign-in, change push
//! - [`RelationalStore`]: filtered select / insert / delete over named tables
//! - [`ObjectStore`]: blob upload/remove and public URL resolution, by bucket
//!
//! Rows cross the relational seam as `serde_json::Value`; the repository
//! layer deserializes them into the typed models.

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::model::{Session, User};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Failure reported by a collaborator, as a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Equality filter on one column.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { column: column.into(), value: value.into() }
    }
}

/// Sort directive for selects.
#[derive(Debug, Clone)]
pub struct Ordering {
    pub column: String,
    pub ascending: bool,
}

impl Ordering {
    pub fn descending(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: false }
    }
}

/// Options for blob uploads.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// When false the upload fails if the path already exists.
    pub overwrite: bool,
    pub cache_control: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { overwrite: false, cache_control: Some("3600".into()) }
    }
}

/// Handle on the session-change push stream.
///
/// Dropping the handle unsubscribes.
pub struct SessionEvents {
    rx: watch::Receiver<Option<Session>>,
}

impl SessionEvents {
    pub fn new(rx: watch::Receiver<Option<Session>>) -> Self {
        Self { rx }
    }

    /// Wait for the next session change. Returns `None` once the store
    /// has shut down and no further notifications will arrive.
    pub async fn next(&mut self) -> Option<Option<Session>> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }
}

/// Session issuance, validation, and change notification.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve the identity behind the current session, if any.
    async fn current_user(&self) -> Result<Option<User>, StoreError>;

    /// The current session, if any.
    async fn session(&self) -> Result<Option<Session>, StoreError>;

    /// Exchange credentials for a session. A successful sign-in also pushes
    /// a change notification to subscribers.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, StoreError>;

    /// End the current session. Pushes a change notification on success.
    async fn sign_out(&self) -> Result<(), StoreError>;

    /// Subscribe to session changes.
    fn subscribe(&self) -> SessionEvents;
}

/// Durable tables with row-level ownership enforced server-side.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Select rows matching every filter, optionally ordered.
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<Ordering>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Insert one row and return it as persisted (server-assigned id and
    /// timestamps included).
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Delete rows matching every filter. Matching zero rows is not an error.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;
}

/// Binary blob storage namespaced by bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<(), StoreError>;

    /// Resolve the public URL for a stored blob. Purely computational.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Best-effort removal; callers compensating for a failed write may
    /// ignore the result.
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StoreError>;
}

/// The three collaborator contracts bundled for hand-off to services.
#[derive(Clone)]
pub struct Backend {
    pub sessions: Arc<dyn SessionStore>,
    pub tables: Arc<dyn RelationalStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Backend {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tables: Arc<dyn RelationalStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self { sessions, tables, objects }
    }
}
