//! API layer - HTTP handlers and routing
//!
//! The HTTP boundary of the Confmate auth backend:
//! - OAuth entry point and callback
//! - Current-user lookup
//! - Admin authentication, usage readings and user count
//!
//! Handlers are thin: they extract parameters, call a service, and map
//! `AuthError` to a response. Every request, on every route, passes the
//! usage-counting middleware.

pub mod admin;
pub mod middleware;
pub mod oauth;
pub mod user;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState};

/// Build the main router
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET])
            .allow_headers([header::CONTENT_TYPE, header::COOKIE])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(cors_origin, "Invalid CORS origin, falling back to same-origin");
            CorsLayer::new()
        }
    };

    let api = Router::new()
        .route("/oauth", get(oauth::begin))
        .route("/oauth/callback", get(oauth::callback))
        .route("/user", get(user::current_user))
        .route("/admin/authenticate", get(admin::authenticate))
        .route("/admin/usage", get(admin::usage_readings))
        .route("/admin/users", get(admin::user_count));

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Usage counting (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::count_requests,
        ))
        .with_state(state)
}
