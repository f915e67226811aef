//! Hosted-backend implementation of the store contracts
//!
//! Speaks the three REST surfaces of a Supabase-style deployment:
//! - `/auth/v1` for sessions (password grant, logout, user lookup)
//! - `/rest/v1` for tables (filtered select, insert-returning, delete)
//! - `/storage/v1` for blobs (upload, public URL, remove)
//!
//! The current session is held behind a lock and every change (sign-in,
//! sign-out) is published on a watch channel, which is what
//! [`SessionStore::subscribe`] hands out.

use super::{
    Filter, ObjectStore, Ordering, RelationalStore, SessionEvents, SessionStore, StoreError,
    UploadOptions,
};
use crate::config::BackendConfig;
use crate::model::{Session, User};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{RwLock, watch};
use tracing::debug;

/// Client for one hosted backend deployment.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    changes: watch::Sender<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: User,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(None),
            changes,
        }
    }

    /// Attach the api key and the strongest available authorization token.
    async fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        };
        req.header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn set_session(&self, next: Option<Session>) {
        *self.session.write().await = next.clone();
        // Receivers may all be gone; that just means nobody is listening.
        let _ = self.changes.send(next);
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|f| {
                let literal = match &f.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (f.column.clone(), format!("eq.{literal}"))
            })
            .collect()
    }
}

async fn into_store_error(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    StoreError::new(format!("backend returned {status}: {body}"))
}

#[async_trait]
impl SessionStore for HttpBackend {
    async fn current_user(&self) -> Result<Option<User>, StoreError> {
        let token = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => return Ok(None),
        };

        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        let user: User = response
            .json()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;
        Ok(Some(user))
    }

    async fn session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.session.read().await.clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, StoreError> {
        debug!(email, "signing in with password");
        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=password",
                self.base_url
            ))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;
        let session = Session {
            user: token.user,
            access_token: token.access_token,
        };
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let request = self
            .http
            .post(format!("{}/auth/v1/logout", self.base_url));
        let response = self
            .authed(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        self.set_session(None).await;
        Ok(())
    }

    fn subscribe(&self) -> SessionEvents {
        SessionEvents::new(self.changes.subscribe())
    }
}

#[async_trait]
impl RelationalStore for HttpBackend {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<Ordering>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut query = Self::filter_pairs(filters);
        if let Some(order) = order {
            let direction = if order.ascending { "asc" } else { "desc" };
            query.push(("order".into(), format!("{}.{direction}", order.column)));
        }

        debug!(table, "select");
        let request = self.http.get(self.table_url(table)).query(&query);
        let response = self
            .authed(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::new(e.to_string()))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        debug!(table, "insert");
        let request = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        let response = self
            .authed(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        // PostgREST returns the representation as a one-element array.
        let mut rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;
        rows.pop()
            .ok_or_else(|| StoreError::new("insert returned no representation"))
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        debug!(table, "delete");
        let request = self
            .http
            .delete(self.table_url(table))
            .query(&Self::filter_pairs(filters));
        let response = self
            .authed(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<(), StoreError> {
        debug!(bucket, path, size = bytes.len(), "upload");
        let mut request = self
            .http
            .post(format!(
                "{}/storage/v1/object/{bucket}/{path}",
                self.base_url
            ))
            .header("x-upsert", options.overwrite.to_string())
            .body(bytes);
        if let Some(cache_control) = &options.cache_control {
            request = request.header("cache-control", format!("max-age={cache_control}"));
        }

        let response = self
            .authed(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StoreError> {
        debug!(bucket, count = paths.len(), "remove");
        let request = self
            .http
            .delete(format!("{}/storage/v1/object/{bucket}", self.base_url))
            .json(&json!({ "prefixes": paths }));
        let response = self
            .authed(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }
        Ok(())
    }
}
