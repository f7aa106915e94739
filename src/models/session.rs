//! Session model
//!
//! A session is created unactivated when a client first contacts the OAuth
//! entry point, and is bound to a user and provider token exactly once after
//! a successful code exchange. Expiry is passive: it is detected at read
//! time, never applied as a state change.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a session identifier (64 hex chars)
const ID_BYTES: usize = 32;

/// Session entity for user authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (opaque high-entropy token, the external handle)
    pub id: String,
    /// Provider access token, set only upon activation. Never serialized
    /// into responses.
    #[serde(skip_serializing, default)]
    pub provider_token: Option<String>,
    /// Associated user ID, set only upon activation
    pub user_id: Option<i64>,
    /// Whether the session has been activated
    pub activated: bool,
    /// Expiration timestamp, meaningful only when activated
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new unactivated session with a freshly generated ID.
    ///
    /// Invariant: an unactivated session carries no user, token or expiry.
    pub fn new_unactivated() -> Self {
        Self {
            id: generate_token(),
            provider_token: None,
            user_id: None,
            activated: false,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Check if the session has expired.
    ///
    /// Unactivated sessions have no expiry and never report expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now(),
            None => false,
        }
    }
}

/// Securely generate an opaque hex token (64 chars from 32 CSPRNG bytes).
///
/// Used for both session IDs and admin session tokens.
pub fn generate_token() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_unactivated_invariant() {
        let session = Session::new_unactivated();
        assert!(!session.activated);
        assert!(session.provider_token.is_none());
        assert!(session.user_id.is_none());
        assert!(session.expires_at.is_none());
    }

    #[test]
    fn test_generated_ids_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_unactivated_session_never_expired() {
        let session = Session::new_unactivated();
        assert!(!session.is_expired());
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let mut session = Session::new_unactivated();
        session.activated = true;
        session.user_id = Some(1);
        session.provider_token = Some("tok".to_string());

        session.expires_at = Some(now + Duration::hours(1));
        assert!(!session.is_expired());

        session.expires_at = Some(now - Duration::hours(1));
        assert!(session.is_expired());
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Expiry depends only on which side of now the deadline falls.
        /// Offsets below two seconds are excluded so the clock cannot
        /// cross the deadline mid-test.
        #[test]
        fn property_expiry_matches_deadline_sign(
            in_future in any::<bool>(),
            offset_secs in 2i64..86_400,
        ) {
            let offset = if in_future { offset_secs } else { -offset_secs };
            let mut session = Session::new_unactivated();
            session.activated = true;
            session.expires_at = Some(Utc::now() + Duration::seconds(offset));
            prop_assert_eq!(session.is_expired(), !in_future);
        }

        /// Generated session ids are always 64 lowercase hex characters.
        #[test]
        fn property_token_shape(_seed in 0u8..16) {
            let token = generate_token();
            prop_assert_eq!(token.len(), 64);
            prop_assert!(token
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
