//! # Homestash - Personal Inventory Client
//!
//! Thin async client over a hosted backend for managing a personal inventory
//! of items, their photos, and per-item usage logs.
//!
//! Homestash provides:
//! - Typed models for items, photos, and usage log rows
//! - Collaborator contracts for the session, relational, and object stores
//! - An HTTP implementation of those contracts for Supabase-style backends
//! - Owner-scoped item CRUD, a partial-failure-aware photo uploader,
//!   and on-demand usage statistics
//! - A reactive session context feeding route guarding decisions

pub mod config;
pub mod guard;
pub mod items;
pub mod model;
pub mod photos;
pub mod session;
pub mod store;
pub mod usage;

// Re-exports for convenient access
pub use config::BackendConfig;
pub use guard::RouteDecision;
pub use items::ItemRepository;
pub use model::{Item, ItemInput, ItemPhoto, Session, UsageLogEntry, UsageStats, User};
pub use photos::{PhotoFile, PhotoUploader, UploadOutcome};
pub use session::{AuthState, SessionContext};
pub use store::{Backend, HttpBackend, MemoryBackend};
pub use usage::UsageLogs;

/// Result type alias for Homestash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Homestash operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A valid session was required but none was available.
    #[error("authentication required: {0}")]
    Auth(String),

    /// Caller-supplied input was missing or malformed.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A collaborator (session, relational, or object store) reported a
    /// failure; `operation` names what was being attempted.
    #[error("{operation}: {message}")]
    Collaborator { operation: String, message: String },
}

impl Error {
    /// Wrap a store failure with the name of the failing operation.
    pub(crate) fn collaborator(operation: impl Into<String>, err: store::StoreError) -> Self {
        Error::Collaborator {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}
