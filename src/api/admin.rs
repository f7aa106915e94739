//! Admin endpoints
//!
//! `GET /api/admin/authenticate` accepts either a valid `admin_session`
//! cookie or a `password` query parameter; success sets the cookie for
//! follow-up calls. The usage and user-count endpoints require the cookie.
//!
//! Admin rejections are deliberately non-descriptive: the reason goes to
//! the log, the caller only sees 401.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::middleware::{extract_cookie, ApiError, AppState};
use crate::models::UsageReading;

/// Cookie carrying the admin session token
const ADMIN_COOKIE: &str = "admin_session";

/// Cookie lifetime, matching the token TTL
const ADMIN_COOKIE_MAX_AGE_SECS: i64 = 4 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct AuthenticateParams {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserCountResponse {
    pub count: i64,
}

/// Check the admin cookie against the gate
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = extract_cookie(headers, ADMIN_COOKIE);
    state
        .admin
        .authenticate_token(token.as_deref())
        .await
        .map_err(ApiError::from_admin_auth)
}

/// `GET /api/admin/authenticate`
pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthenticateParams>,
) -> Result<Response, ApiError> {
    // An existing valid cookie wins; no password needed
    if require_admin(&state, &headers).await.is_ok() {
        return Ok(Json(json!({ "status": "ok" })).into_response());
    }

    let password = params.password.ok_or(ApiError::Unauthorized)?;
    let token = state
        .admin
        .authenticate(&password)
        .await
        .map_err(ApiError::from_admin_auth)?;

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        ADMIN_COOKIE, token, ADMIN_COOKIE_MAX_AGE_SECS
    );
    let mut response = Json(json!({ "status": "ok" })).into_response();
    match cookie.parse() {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(_) => return Err(ApiError::Internal),
    }
    Ok(response)
}

/// `GET /api/admin/usage`
pub async fn usage_readings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UsageReading>>, ApiError> {
    require_admin(&state, &headers).await?;

    let readings = state
        .usage_repo
        .list()
        .await
        .map_err(|e| ApiError::from_admin_auth(e.into()))?;

    Ok(Json(readings))
}

/// `GET /api/admin/users`
pub async fn user_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserCountResponse>, ApiError> {
    require_admin(&state, &headers).await?;

    let count = state
        .users
        .count()
        .await
        .map_err(|e| ApiError::from_admin_auth(e.into()))?;

    Ok(Json(UserCountResponse { count }))
}
