//! User model
//!
//! Users are keyed by the OAuth provider's numeric identity and created
//! lazily on first successful authorization. Only the authentication-relevant
//! fields live here; conference profile data is a collaborator concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity representing an attendee known through the OAuth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique local identifier
    pub id: i64,
    /// The provider's numeric identity for this user (unique)
    pub provider_id: i64,
    /// Display name reported by the provider profile
    pub display_name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new User for the given provider identity.
    ///
    /// The local `id` is assigned by the database on insert.
    pub fn new(provider_id: i64, display_name: String) -> Self {
        Self {
            id: 0,
            provider_id,
            display_name,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new(987654321, "Ada".to_string());
        assert_eq!(user.id, 0);
        assert_eq!(user.provider_id, 987654321);
        assert_eq!(user.display_name, "Ada");
    }
}
