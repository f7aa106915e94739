//! Services layer - Business logic
//!
//! This module contains the business logic of the Confmate auth backend:
//! the session lifecycle, the OAuth exchange, the admin gate and the usage
//! counter. Services coordinate repositories and hold whatever in-process
//! state the domain needs; all errors are raised here and mapped to HTTP
//! responses only at the API boundary.

pub mod admin;
pub mod oauth;
pub mod password;
pub mod session;
pub mod usage;

pub use admin::AdminGate;
pub use oauth::{FacebookOAuth, OAuthProvider, OAuthService, ProviderProfile};
pub use password::{hash_password, verify_password};
pub use session::{spawn_cleanup_task, SessionService};
pub use usage::{spawn_drain_task, UsageCounter};

use thiserror::Error;

/// Authentication and authorization errors.
///
/// Raised at the point of detection and handled only at the request
/// boundary. The `Unauthenticated` reason string is for operators and
/// logs; the HTTP layer never leaks it to admin callers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The caller could not be authenticated
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Too many failed admin attempts; retry after the given delay
    #[error("locked out, retry in {retry_after_secs}s")]
    LockedOut {
        /// Seconds until the lockout window closes
        retry_after_secs: i64,
    },

    /// Credentials were checked and rejected
    #[error("access denied")]
    Denied,

    /// The backing store failed; fatal to the request, never the process
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Shorthand for `Unauthenticated` with a static reason
    pub fn unauthenticated(reason: &str) -> Self {
        Self::Unauthenticated(reason.to_string())
    }
}
