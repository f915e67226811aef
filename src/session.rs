//! Session Context - process-wide reactive holder of the current session
//!
//! Starts in `Loading`, resolves to `Unauthenticated` or `Authenticated`
//! after one initial fetch, and from then on is written only by the session
//! store's change notifications. `sign_in`/`sign_out` delegate to the store
//! and propagate its errors without touching held state; the notification
//! the store pushes afterwards is the sole write path.

use crate::model::Session;
use crate::store::SessionStore;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// The authentication state of the running application.
///
/// A tagged variant rather than boolean flags, so authenticated-but-loading
/// is unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// The initial session fetch has not resolved yet.
    Loading,
    Unauthenticated,
    Authenticated(Session),
}

impl AuthState {
    fn from_session(session: Option<Session>) -> Self {
        match session {
            Some(session) => AuthState::Authenticated(session),
            None => AuthState::Unauthenticated,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

pub struct SessionContext {
    sessions: Arc<dyn SessionStore>,
    state: watch::Receiver<AuthState>,
    listener: JoinHandle<()>,
}

impl SessionContext {
    /// Start the context: fetch the current session once, then follow the
    /// store's change notifications for the rest of the process lifetime.
    pub fn start(sessions: Arc<dyn SessionStore>) -> Self {
        let (tx, rx) = watch::channel(AuthState::Loading);
        // Subscribe before the initial fetch so no change can fall between.
        let mut events = sessions.subscribe();
        let store = sessions.clone();

        let listener = tokio::spawn(async move {
            let initial = match store.session().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "initial session fetch failed");
                    None
                }
            };
            let _ = tx.send(AuthState::from_session(initial));

            while let Some(next) = events.next().await {
                let _ = tx.send(AuthState::from_session(next));
            }
        });

        Self { sessions, state: rx, listener }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// A receiver that observes every state transition; useful for callers
    /// that want to await a change rather than poll.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Exchange credentials for a session. Held state is not modified here;
    /// the store's change notification updates it.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        self.sessions
            .sign_in_with_password(email, password)
            .await
            .map(|_| ())
            .map_err(|e| Error::collaborator("sign-in failed", e))
    }

    /// End the current session; same propagation rule as [`sign_in`].
    ///
    /// [`sign_in`]: SessionContext::sign_in
    pub async fn sign_out(&self) -> Result<()> {
        self.sessions
            .sign_out()
            .await
            .map_err(|e| Error::collaborator("sign-out failed", e))
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        // Stop following notifications so no state is written after teardown.
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use crate::store::MemoryBackend;
    use uuid::Uuid;

    fn test_user() -> User {
        User { id: Uuid::new_v4(), email: Some("a@example.com".into()) }
    }

    /// Wait until the context reaches a state matching the predicate;
    /// resolves immediately if it already has.
    async fn wait_until(rx: &mut watch::Receiver<AuthState>, f: impl Fn(&AuthState) -> bool) {
        rx.wait_for(|s| f(s)).await.expect("context gone");
    }

    #[tokio::test]
    async fn test_loading_until_initial_fetch_resolves() {
        let store = MemoryBackend::new();
        let gate = store.hold_session_fetch();

        let context = SessionContext::start(store.clone());
        assert!(context.state().is_loading());
        assert!(!context.is_authenticated());

        let mut rx = context.watch();
        gate.notify_one();
        wait_until(&mut rx, |s| *s == AuthState::Unauthenticated).await;
        assert!(!context.state().is_loading());
    }

    #[tokio::test]
    async fn test_change_notification_authenticates_without_reloading() {
        let store = MemoryBackend::new();
        let context = SessionContext::start(store.clone());

        let mut rx = context.watch();
        wait_until(&mut rx, |s| *s == AuthState::Unauthenticated).await;

        let session = Session { user: test_user(), access_token: "t".into() };
        store.push_session(Some(session.clone()));
        wait_until(&mut rx, |s| *s == AuthState::Authenticated(session.clone())).await;
        assert!(context.is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_in_and_out_drive_state_through_notifications() {
        let store = MemoryBackend::new();
        store.register_credentials("a@example.com", "hunter2", test_user());
        let context = SessionContext::start(store.clone());

        let mut rx = context.watch();
        wait_until(&mut rx, |s| *s == AuthState::Unauthenticated).await;

        context.sign_in("a@example.com", "hunter2").await.unwrap();
        wait_until(&mut rx, |s| s.is_authenticated()).await;

        context.sign_out().await.unwrap();
        wait_until(&mut rx, |s| *s == AuthState::Unauthenticated).await;
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_state_untouched() {
        let store = MemoryBackend::new();
        let context = SessionContext::start(store.clone());

        let mut rx = context.watch();
        wait_until(&mut rx, |s| *s == AuthState::Unauthenticated).await;

        let err = context.sign_in("a@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
        assert_eq!(context.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_initial_session_is_picked_up() {
        let store = MemoryBackend::new();
        let session = Session { user: test_user(), access_token: "t".into() };
        store.push_session(Some(session.clone()));

        let context = SessionContext::start(store.clone());
        let mut rx = context.watch();
        wait_until(&mut rx, |s| *s == AuthState::Authenticated(session.clone())).await;
    }
}
