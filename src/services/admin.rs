//! Admin gate
//!
//! Password authentication for the administrator, with brute-force lockout
//! bookkeeping and short-lived in-process admin session tokens.
//!
//! Lockout state and issued tokens live in process memory only; a restart
//! clears both. Administrators simply re-authenticate.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::models::session::generate_token;
use crate::services::{password, AuthError};

/// Consecutive failures that trigger a lockout
const MAX_FAILURES: u32 = 3;

/// Lockout duration, also the window in which failures count as consecutive
const LOCKOUT_SECS: i64 = 30 * 60;

/// Admin session token lifetime
const TOKEN_TTL_SECS: i64 = 4 * 60 * 60;

/// Brute-force bookkeeping for the single admin credential
#[derive(Debug, Default)]
struct LoginAttemptState {
    failed_count: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

/// Administrator credential gate
pub struct AdminGate {
    password_hash: String,
    attempts: Mutex<LoginAttemptState>,
    tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    max_failures: u32,
    lockout: Duration,
    token_ttl: Duration,
}

impl AdminGate {
    /// Create a gate for the given argon2 reference hash
    pub fn new(password_hash: String) -> Self {
        Self {
            password_hash,
            attempts: Mutex::new(LoginAttemptState::default()),
            tokens: RwLock::new(HashMap::new()),
            max_failures: MAX_FAILURES,
            lockout: Duration::seconds(LOCKOUT_SECS),
            token_ttl: Duration::seconds(TOKEN_TTL_SECS),
        }
    }

    /// Create a gate with custom thresholds (for tests)
    pub fn with_limits(
        password_hash: String,
        max_failures: u32,
        lockout: Duration,
        token_ttl: Duration,
    ) -> Self {
        Self {
            password_hash,
            attempts: Mutex::new(LoginAttemptState::default()),
            tokens: RwLock::new(HashMap::new()),
            max_failures,
            lockout,
            token_ttl,
        }
    }

    /// Authenticate with the admin password, minting a session token.
    ///
    /// While a lockout is open every attempt fails fast with `LockedOut`,
    /// correct password or not. The failure that reaches the threshold
    /// still reports `Denied`; the lockout applies from the next attempt.
    pub async fn authenticate(&self, candidate: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let mut attempts = self.attempts.lock().await;

        if let Some(locked_until) = attempts.locked_until {
            if now < locked_until {
                let retry_after_secs = (locked_until - now).num_seconds().max(1);
                tracing::warn!(retry_after_secs, "Admin attempt during lockout");
                return Err(AuthError::LockedOut { retry_after_secs });
            }
            // Window over, start from a clean slate
            attempts.locked_until = None;
            attempts.failed_count = 0;
        }

        // Failures only count as consecutive within the window
        if let Some(last) = attempts.last_attempt_at {
            if now - last > self.lockout {
                attempts.failed_count = 0;
            }
        }
        attempts.last_attempt_at = Some(now);

        // A missing or malformed reference hash can never match any
        // password; treat it as a mismatch, not a storage fault
        let matches = match password::verify_password(candidate, &self.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!("Admin reference hash is unusable: {:#}", e);
                false
            }
        };
        if !matches {
            attempts.failed_count += 1;
            tracing::warn!(failed_count = attempts.failed_count, "Admin password rejected");
            if attempts.failed_count >= self.max_failures {
                attempts.locked_until = Some(now + self.lockout);
                attempts.failed_count = 0;
            }
            return Err(AuthError::Denied);
        }

        attempts.failed_count = 0;
        attempts.locked_until = None;
        drop(attempts);

        let token = generate_token();
        let expires_at = now + self.token_ttl;
        self.tokens.write().await.insert(token.clone(), expires_at);
        tracing::info!("Admin authenticated, session token issued");
        Ok(token)
    }

    /// Check an admin session token.
    ///
    /// Expired entries are evicted lazily here rather than by a sweeper.
    pub async fn authenticate_token(&self, token: Option<&str>) -> Result<(), AuthError> {
        let token = token.ok_or_else(|| AuthError::unauthenticated("no token"))?;

        let expires_at = {
            let tokens = self.tokens.read().await;
            tokens.get(token).copied()
        };

        match expires_at {
            None => Err(AuthError::unauthenticated("unrecognised token")),
            Some(expires_at) if expires_at < Utc::now() => {
                self.tokens.write().await.remove(token);
                Err(AuthError::unauthenticated("expired"))
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::password::hash_password;

    fn gate() -> AdminGate {
        let hash = hash_password("open-sesame").expect("Hashing failed");
        AdminGate::new(hash)
    }

    fn gate_with_lockout(lockout: Duration) -> AdminGate {
        let hash = hash_password("open-sesame").expect("Hashing failed");
        AdminGate::with_limits(hash, 3, lockout, Duration::hours(4))
    }

    #[tokio::test]
    async fn test_correct_password_issues_token() {
        let gate = gate();

        let token = gate.authenticate("open-sesame").await.expect("Auth failed");
        assert_eq!(token.len(), 64);
        gate.authenticate_token(Some(&token))
            .await
            .expect("Token should be valid");
    }

    #[tokio::test]
    async fn test_wrong_password_denied() {
        let gate = gate();
        let err = gate.authenticate("guess").await.unwrap_err();
        assert!(matches!(err, AuthError::Denied));
    }

    #[tokio::test]
    async fn test_empty_reference_hash_denies_every_attempt() {
        // The config default: no hash configured means no admin access,
        // reported as a rejection rather than a server fault
        let gate = AdminGate::new(String::new());
        let err = gate.authenticate("any-password").await.unwrap_err();
        assert!(matches!(err, AuthError::Denied));
    }

    #[tokio::test]
    async fn test_third_failure_opens_lockout() {
        let gate = gate();

        for _ in 0..3 {
            let err = gate.authenticate("guess").await.unwrap_err();
            assert!(matches!(err, AuthError::Denied));
        }

        // Fourth attempt is locked out even with the correct password
        let err = gate.authenticate("open-sesame").await.unwrap_err();
        match err {
            AuthError::LockedOut { retry_after_secs } => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 30 * 60);
            }
            other => panic!("expected LockedOut, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lockout_expires() {
        // Negative lockout: the window is already over when set
        let gate = gate_with_lockout(Duration::seconds(-1));

        for _ in 0..3 {
            let _ = gate.authenticate("guess").await.unwrap_err();
        }

        let token = gate
            .authenticate("open-sesame")
            .await
            .expect("Auth should succeed after window");
        assert_eq!(token.len(), 64);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let gate = gate();

        for _ in 0..2 {
            let _ = gate.authenticate("guess").await.unwrap_err();
        }
        gate.authenticate("open-sesame").await.expect("Auth failed");

        // Counter reset: two more failures do not lock
        for _ in 0..2 {
            let err = gate.authenticate("guess").await.unwrap_err();
            assert!(matches!(err, AuthError::Denied));
        }
        gate.authenticate("open-sesame").await.expect("Auth failed");
    }

    #[tokio::test]
    async fn test_token_checks() {
        let gate = gate();

        let err = gate.authenticate_token(None).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(r) if r == "no token"));

        let err = gate.authenticate_token(Some("bogus")).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(r) if r == "unrecognised token"));
    }

    #[tokio::test]
    async fn test_expired_token_evicted() {
        let hash = hash_password("open-sesame").expect("Hashing failed");
        let gate = AdminGate::with_limits(hash, 3, Duration::minutes(30), Duration::seconds(-1));

        let token = gate.authenticate("open-sesame").await.expect("Auth failed");

        let err = gate.authenticate_token(Some(&token)).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(r) if r == "expired"));

        // Evicted: the second check no longer recognises it
        let err = gate.authenticate_token(Some(&token)).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(r) if r == "unrecognised token"));
    }
}
