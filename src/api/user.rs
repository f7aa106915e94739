//! User endpoint
//!
//! `GET /api/user` resolves the authenticated user for a session. Any
//! rejection sends the client back to the OAuth entry point.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::middleware::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct UserParams {
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: i64,
    pub name: String,
}

/// `GET /api/user`
pub async fn current_user(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<Json<UserResponse>, ApiError> {
    let session_id = params.session.ok_or(ApiError::RedirectToLogin)?;

    let user = state
        .sessions
        .validate(&session_id)
        .await
        .map_err(ApiError::from_user_auth)?;

    Ok(Json(UserResponse {
        user: user.id,
        name: user.display_name,
    }))
}
