//! Route Guard - maps auth state to a routing decision
//!
//! Pure function over [`AuthState`]; the UI shell consuming the decision
//! lives outside this crate.

use crate::model::User;
use crate::session::AuthState;

pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// What to do with a request for a protected location.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Session state is still loading; show a placeholder.
    Pending,
    /// No session; send the caller to the login entry point, remembering
    /// where they wanted to go so the login flow can return them there.
    RedirectToLogin { login: String, from: String },
    /// Session present; render the protected content for this user.
    Allow { user: User },
}

/// Resolve a request for `requested` against the current auth state.
pub fn resolve(state: &AuthState, requested: &str, login_path: &str) -> RouteDecision {
    match state {
        AuthState::Loading => RouteDecision::Pending,
        AuthState::Unauthenticated => RouteDecision::RedirectToLogin {
            login: login_path.to_string(),
            from: requested.to_string(),
        },
        AuthState::Authenticated(session) => RouteDecision::Allow {
            user: session.user.clone(),
        },
    }
}
