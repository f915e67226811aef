//! In-memory implementation of the store contracts
//!
//! Backs the test suite and offline development. Tables are JSON rows with
//! server-assigned ids and strictly increasing timestamps, blobs live in a
//! map keyed by (bucket, path), and sessions are driven by registered
//! credentials or pushed directly. Supports failure injection for uploads
//! and inserts, and counts collaborator calls so tests can assert that
//! short-circuit paths perform no I/O.

use super::{
    Filter, ObjectStore, Ordering, RelationalStore, SessionEvents, SessionStore, StoreError,
    UploadOptions,
};
use crate::model::{Session, User};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, watch};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Value>>,
    next_id: HashMap<String, i64>,
}

pub struct MemoryBackend {
    tables: Mutex<Tables>,
    last_timestamp: Mutex<DateTime<Utc>>,
    failing_insert_tables: Mutex<HashSet<String>>,
    relational_calls: AtomicUsize,

    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
    removed_paths: Mutex<Vec<String>>,
    upload_calls: AtomicUsize,
    failing_upload_calls: Mutex<HashSet<usize>>,
    object_calls: AtomicUsize,

    credentials: Mutex<HashMap<String, (String, User)>>,
    session: Mutex<Option<Session>>,
    session_gate: Mutex<Option<Arc<Notify>>>,
    changes: watch::Sender<Option<Session>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            tables: Mutex::default(),
            last_timestamp: Mutex::new(Utc::now()),
            failing_insert_tables: Mutex::default(),
            relational_calls: AtomicUsize::new(0),
            blobs: Mutex::default(),
            removed_paths: Mutex::default(),
            upload_calls: AtomicUsize::new(0),
            failing_upload_calls: Mutex::default(),
            object_calls: AtomicUsize::new(0),
            credentials: Mutex::default(),
            session: Mutex::new(None),
            session_gate: Mutex::default(),
            changes,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this backend as all three collaborators.
    pub fn backend(self: &Arc<Self>) -> super::Backend {
        super::Backend::new(self.clone(), self.clone(), self.clone())
    }

    /// Register credentials accepted by [`SessionStore::sign_in_with_password`].
    pub fn register_credentials(&self, email: &str, password: &str, user: User) {
        self.credentials
            .lock()
            .expect("poisoned lock")
            .insert(email.to_string(), (password.to_string(), user));
    }

    /// Install a session directly and push the change to subscribers.
    pub fn push_session(&self, session: Option<Session>) {
        *self.session.lock().expect("poisoned lock") = session.clone();
        let _ = self.changes.send(session);
    }

    /// Sign a user in without credentials, for tests that need an
    /// authenticated caller.
    pub fn sign_in_as(&self, user: User) {
        self.push_session(Some(Session {
            user,
            access_token: "test-token".into(),
        }));
    }

    /// Block [`SessionStore::session`] until the returned handle is
    /// notified, so tests can observe the pre-fetch state.
    pub fn hold_session_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.session_gate.lock().expect("poisoned lock") = Some(gate.clone());
        gate
    }

    /// Make the nth, 1-based, upload call fail.
    pub fn fail_upload_calls(&self, calls: &[usize]) {
        self.failing_upload_calls
            .lock()
            .expect("poisoned lock")
            .extend(calls.iter().copied());
    }

    /// Make every insert into `table` fail.
    pub fn fail_inserts_into(&self, table: &str) {
        self.failing_insert_tables
            .lock()
            .expect("poisoned lock")
            .insert(table.to_string());
    }

    /// Total calls made against the relational and object contracts.
    pub fn collaborator_calls(&self) -> usize {
        self.relational_calls.load(AtomicOrdering::SeqCst)
            + self.object_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().expect("poisoned lock").len()
    }

    pub fn blob_paths(&self, bucket: &str) -> Vec<String> {
        self.blobs
            .lock()
            .expect("poisoned lock")
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Paths passed to [`ObjectStore::remove`], in call order.
    pub fn removed_paths(&self) -> Vec<String> {
        self.removed_paths.lock().expect("poisoned lock").clone()
    }

    /// Strictly increasing server clock, so `created_at` ordering is
    /// never ambiguous even for back-to-back inserts.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock().expect("poisoned lock");
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + TimeDelta::microseconds(1)
        };
        *last = next;
        next
    }

    fn matches(row: &Value, filters: &[Filter]) -> bool {
        filters
            .iter()
            .all(|f| row.get(&f.column) == Some(&f.value))
    }
}

/// Column comparator: timestamps first, then numbers, then raw strings.
fn compare_column(a: &Value, b: &Value) -> std::cmp::Ordering {
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        if let (Ok(a), Ok(b)) = (
            DateTime::parse_from_rfc3339(a),
            DateTime::parse_from_rfc3339(b),
        ) {
            return a.cmp(&b);
        }
        return a.cmp(b);
    }
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a.cmp(&b);
    }
    a.to_string().cmp(&b.to_string())
}

#[async_trait]
impl RelationalStore for MemoryBackend {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<Ordering>,
    ) -> Result<Vec<Value>, StoreError> {
        self.relational_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let tables = self.tables.lock().expect("poisoned lock");
        let mut rows: Vec<Value> = tables
            .rows
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| Self::matches(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            let null = Value::Null;
            rows.sort_by(|a, b| {
                let ordering = compare_column(
                    a.get(&order.column).unwrap_or(&null),
                    b.get(&order.column).unwrap_or(&null),
                );
                if order.ascending { ordering } else { ordering.reverse() }
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        self.relational_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self
            .failing_insert_tables
            .lock()
            .expect("poisoned lock")
            .contains(table)
        {
            return Err(StoreError::new(format!("injected insert failure for {table}")));
        }

        let mut persisted = row;
        let object = persisted
            .as_object_mut()
            .ok_or_else(|| StoreError::new("insert payload must be a JSON object"))?;

        if !object.contains_key("id") {
            // The items table uses uuid keys; everything else is serial.
            if table == "items" {
                object.insert("id".into(), Value::from(Uuid::new_v4().to_string()));
            } else {
                let mut tables = self.tables.lock().expect("poisoned lock");
                let next = tables.next_id.entry(table.to_string()).or_insert(1);
                object.insert("id".into(), Value::from(*next));
                *next += 1;
            }
        }
        if !object.contains_key("created_at") {
            object.insert(
                "created_at".into(),
                Value::from(self.next_timestamp().to_rfc3339()),
            );
        }

        self.tables
            .lock()
            .expect("poisoned lock")
            .rows
            .entry(table.to_string())
            .or_default()
            .push(persisted.clone());
        Ok(persisted)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        self.relational_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut tables = self.tables.lock().expect("poisoned lock");
        if let Some(rows) = tables.rows.get_mut(table) {
            rows.retain(|row| !Self::matches(row, filters));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<(), StoreError> {
        self.object_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let call = self.upload_calls.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        if self
            .failing_upload_calls
            .lock()
            .expect("poisoned lock")
            .contains(&call)
        {
            return Err(StoreError::new("injected upload failure"));
        }

        let key = (bucket.to_string(), path.to_string());
        let mut blobs = self.blobs.lock().expect("poisoned lock");
        if !options.overwrite && blobs.contains_key(&key) {
            return Err(StoreError::new("the resource already exists"));
        }
        blobs.insert(key, bytes);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StoreError> {
        self.object_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut blobs = self.blobs.lock().expect("poisoned lock");
        let mut removed = self.removed_paths.lock().expect("poisoned lock");
        for path in paths {
            blobs.remove(&(bucket.to_string(), path.clone()));
            removed.push(path.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn current_user(&self) -> Result<Option<User>, StoreError> {
        Ok(self
            .session
            .lock()
            .expect("poisoned lock")
            .as_ref()
            .map(|s| s.user.clone()))
    }

    async fn session(&self) -> Result<Option<Session>, StoreError> {
        let gate = self.session_gate.lock().expect("poisoned lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.session.lock().expect("poisoned lock").clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, StoreError> {
        let user = {
            let credentials = self.credentials.lock().expect("poisoned lock");
            match credentials.get(email) {
                Some((expected, user)) if expected == password => user.clone(),
                _ => return Err(StoreError::new("invalid login credentials")),
            }
        };

        let session = Session {
            user,
            access_token: Uuid::new_v4().to_string(),
        };
        self.push_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.push_session(None);
        Ok(())
    }

    fn subscribe(&self) -> SessionEvents {
        SessionEvents::new(self.changes.subscribe())
    }
}
