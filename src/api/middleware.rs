//! API middleware and shared state
//!
//! Contains:
//! - `AppState`: the dependency-injection context handed to every handler
//! - `ApiError`: the response-side mapping of `AuthError`
//! - the usage-counting middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::db::repositories::{UsageRepository, UserRepository};
use crate::services::{AdminGate, AuthError, OAuthService, SessionService, UsageCounter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub oauth: Arc<OAuthService>,
    pub admin: Arc<AdminGate>,
    pub usage: Arc<UsageCounter>,
    pub users: Arc<dyn UserRepository>,
    pub usage_repo: Arc<dyn UsageRepository>,
}

/// Response-side error for API handlers
#[derive(Debug)]
pub enum ApiError {
    /// User-facing authentication failure: send the client back to the
    /// OAuth entry point to start over
    RedirectToLogin,
    /// Admin-facing authentication failure: non-descriptive 401
    Unauthorized,
    /// Admin lockout window is open
    LockedOut { retry_after_secs: i64 },
    /// Storage or other internal failure; details stay in the logs
    Internal,
}

impl ApiError {
    /// Map an `AuthError` raised on a user-facing route.
    ///
    /// Any authentication failure, whatever the reason, restarts the OAuth
    /// flow rather than explaining itself to the client.
    pub fn from_user_auth(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(reason) => {
                tracing::debug!(reason, "User session rejected");
                Self::RedirectToLogin
            }
            AuthError::Storage(e) => {
                tracing::error!("Storage failure: {:#}", e);
                Self::Internal
            }
            AuthError::Denied | AuthError::LockedOut { .. } => Self::Unauthorized,
        }
    }

    /// Map an `AuthError` raised on an admin route.
    ///
    /// The rejection reason is logged but never sent to the caller.
    pub fn from_admin_auth(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(reason) => {
                tracing::debug!(reason, "Admin token rejected");
                Self::Unauthorized
            }
            AuthError::Denied => Self::Unauthorized,
            AuthError::LockedOut { retry_after_secs } => Self::LockedOut { retry_after_secs },
            AuthError::Storage(e) => {
                tracing::error!("Storage failure: {:#}", e);
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/api/oauth").into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response(),
            Self::LockedOut { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": "locked_out",
                    "retry_after_secs": retry_after_secs,
                })),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal" })),
            )
                .into_response(),
        }
    }
}

/// Extract a named cookie from a Cookie header
pub fn extract_cookie(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;
    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix(name) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Usage counting middleware: every request increments the shared counter
pub async fn count_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    state.usage.increment().await;
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers_with_cookies(cookies: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookies.parse().expect("Invalid cookie"));
        headers
    }

    #[test]
    fn test_extract_cookie() {
        let headers = headers_with_cookies("theme=dark; admin_session=abc123; lang=en");
        assert_eq!(
            extract_cookie(&headers, "admin_session").as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_cookie(&headers, "theme").as_deref(), Some("dark"));
        assert!(extract_cookie(&headers, "session").is_none());
    }

    #[test]
    fn test_extract_cookie_absent_header() {
        let headers = HeaderMap::new();
        assert!(extract_cookie(&headers, "admin_session").is_none());
    }

    #[test]
    fn test_extract_cookie_prefix_name_not_confused() {
        let headers = headers_with_cookies("admin_session_old=stale; admin_session=fresh");
        assert_eq!(
            extract_cookie(&headers, "admin_session").as_deref(),
            Some("fresh")
        );
    }
}
