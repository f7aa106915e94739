//! OAuth endpoints
//!
//! `GET /api/oauth` starts the flow: without a `session` parameter it
//! creates one and returns its id; with one it redirects the browser to
//! the provider's authorization dialogue. `GET /api/oauth/callback`
//! finishes the flow when the provider sends the user back.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::middleware::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct BeginParams {
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizedResponse {
    pub user: i64,
}

/// `GET /api/oauth`
pub async fn begin(
    State(state): State<AppState>,
    Query(params): Query<BeginParams>,
) -> Result<Response, ApiError> {
    match params.session {
        None => {
            let session = state
                .sessions
                .create()
                .await
                .map_err(ApiError::from_user_auth)?;
            Ok(Json(SessionResponse { session: session.id }).into_response())
        }
        Some(session_id) => {
            let url = state.oauth.authorization_url(&session_id);
            Ok(Redirect::temporary(&url).into_response())
        }
    }
}

/// `GET /api/oauth/callback`
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<AuthorizedResponse>, ApiError> {
    let oauth_state = params.state.unwrap_or_default();
    let code = params.code.unwrap_or_default();

    let user = state
        .oauth
        .complete_authorization(&oauth_state, &code)
        .await
        .map_err(ApiError::from_user_auth)?;

    Ok(Json(AuthorizedResponse { user }))
}
