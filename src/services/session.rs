//! Session lifecycle service
//!
//! Drives the two-phase session state machine: a session is created
//! anonymous and unactivated, bound to a user exactly once after a
//! successful OAuth exchange, and considered expired passively once its
//! deadline passes. Expiry is never written back; it is a property of
//! reads.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::AuthError;

/// Default session lifetime: four hours from activation
const DEFAULT_SESSION_LIFETIME_SECS: i64 = 4 * 60 * 60;

/// Session lifecycle service
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    session_lifetime: Duration,
}

impl SessionService {
    /// Create a new session service with the default 4-hour lifetime
    pub fn new(sessions: Arc<dyn SessionRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self {
            sessions,
            users,
            session_lifetime: Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS),
        }
    }

    /// Create a session service with a custom lifetime (for tests)
    pub fn with_session_lifetime(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        session_lifetime: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            session_lifetime,
        }
    }

    /// Create and persist a fresh unactivated session.
    pub async fn create(&self) -> Result<Session, AuthError> {
        let session = Session::new_unactivated();
        let session = self.sessions.create(&session).await?;
        tracing::debug!(session_id = %session.id, "Created unactivated session");
        Ok(session)
    }

    /// Look up a session by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Session>, AuthError> {
        Ok(self.sessions.get_by_id(id).await?)
    }

    /// Activate a session, binding it to a user and provider token.
    ///
    /// Idempotent: activating an already-activated session is a no-op and
    /// the original binding stands. The expiry is fixed at activation time
    /// and the new state is only observable once the persist succeeds.
    pub async fn activate(
        &self,
        id: &str,
        user_id: i64,
        provider_token: &str,
    ) -> Result<(), AuthError> {
        let session = self
            .sessions
            .get_by_id(id)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("not found"))?;

        if session.activated {
            return Ok(());
        }

        let expires_at = Utc::now() + self.session_lifetime;
        let won = self
            .sessions
            .activate(id, user_id, provider_token, expires_at)
            .await?;

        if won {
            tracing::info!(session_id = %id, user_id, "Activated session");
        } else {
            // A concurrent activation got there first; its binding stands
            tracing::debug!(session_id = %id, "Session was already activated");
        }

        Ok(())
    }

    /// Validate a session and resolve its user.
    ///
    /// Fails with `Unauthenticated` and a reason of `"not found"`,
    /// `"not activated"` or `"expired"`.
    pub async fn validate(&self, id: &str) -> Result<User, AuthError> {
        let session = self
            .sessions
            .get_by_id(id)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("not found"))?;

        if !session.activated {
            return Err(AuthError::unauthenticated("not activated"));
        }
        if session.is_expired() {
            return Err(AuthError::unauthenticated("expired"));
        }

        let user_id = session
            .user_id
            .ok_or_else(|| AuthError::unauthenticated("not activated"))?;

        self.users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("not found"))
    }

    /// Resolve the current user for a session, if any.
    ///
    /// Returns `None` for unknown, unactivated or expired sessions instead
    /// of an error.
    pub async fn current_user(&self, id: &str) -> Result<Option<User>, AuthError> {
        match self.validate(id).await {
            Ok(user) => Ok(Some(user)),
            Err(AuthError::Unauthenticated(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove sessions whose expiry has passed, returning the count.
    ///
    /// Storage hygiene only: validity is always decided at read time and
    /// never depends on this sweep having run.
    pub async fn purge_expired(&self) -> Result<i64, AuthError> {
        let removed = self.sessions.delete_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}

/// Spawn the periodic expired-session sweep.
///
/// Unlike the usage drain there is nothing pending to flush, so shutdown
/// stops the task without a final pass.
pub fn spawn_cleanup_task(
    sessions: Arc<SessionService>,
    interval: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sessions.purge_expired().await {
                        tracing::warn!("Expired-session sweep failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (SessionService, Arc<dyn UserRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool);
        (SessionService::new(sessions, users.clone()), users)
    }

    async fn setup_with_lifetime(lifetime: Duration) -> (SessionService, Arc<dyn UserRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool);
        (
            SessionService::with_session_lifetime(sessions, users.clone(), lifetime),
            users,
        )
    }

    fn reason(err: AuthError) -> String {
        match err {
            AuthError::Unauthenticated(reason) => reason,
            other => panic!("expected Unauthenticated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fresh_session_is_not_activated() {
        let (service, _) = setup().await;

        let session = service.create().await.expect("Create failed");
        let err = service.validate(&session.id).await.unwrap_err();
        assert_eq!(reason(err), "not activated");
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let (service, _) = setup().await;

        let err = service.validate("no-such-session").await.unwrap_err();
        assert_eq!(reason(err), "not found");
    }

    #[tokio::test]
    async fn test_activate_then_validate() {
        let (service, users) = setup().await;
        let user = users
            .get_or_create(77, "Attendee")
            .await
            .expect("User create failed");

        let session = service.create().await.expect("Create failed");
        service
            .activate(&session.id, user.id, "provider-token")
            .await
            .expect("Activate failed");

        let resolved = service.validate(&session.id).await.expect("Validate failed");
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.provider_id, 77);
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let (service, users) = setup().await;
        let user = users
            .get_or_create(77, "Attendee")
            .await
            .expect("User create failed");
        let other = users
            .get_or_create(78, "Other")
            .await
            .expect("User create failed");

        let session = service.create().await.expect("Create failed");
        service
            .activate(&session.id, user.id, "first-token")
            .await
            .expect("Activate failed");
        service
            .activate(&session.id, other.id, "second-token")
            .await
            .expect("Activate failed");

        // First activation's binding stands
        let resolved = service.validate(&session.id).await.expect("Validate failed");
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_concurrent_activation_exactly_one_wins() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool);
        let service = Arc::new(SessionService::new(sessions, users.clone()));

        let user = users
            .get_or_create(99, "Racer")
            .await
            .expect("User create failed");
        let session = service.create().await.expect("Create failed");

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let id = session.id.clone();
            let user_id = user.id;
            handles.push(tokio::spawn(async move {
                service.activate(&id, user_id, &format!("token-{}", i)).await
            }));
        }
        for handle in handles {
            handle
                .await
                .expect("Task panicked")
                .expect("Activate failed");
        }

        let stored = service
            .get(&session.id)
            .await
            .expect("Get failed")
            .expect("Session should exist");
        assert!(stored.activated);
        // Exactly one token won; whichever it was, the binding is intact
        assert!(stored.provider_token.is_some());
        assert_eq!(stored.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_expired_session_detected_at_read_time() {
        let (service, users) = setup_with_lifetime(Duration::seconds(-1)).await;
        let user = users
            .get_or_create(55, "Late")
            .await
            .expect("User create failed");

        let session = service.create().await.expect("Create failed");
        service
            .activate(&session.id, user.id, "token")
            .await
            .expect("Activate failed");

        let err = service.validate(&session.id).await.unwrap_err();
        assert_eq!(reason(err), "expired");

        // No transition out of expired: a later read still reports expired
        let err = service.validate(&session.id).await.unwrap_err();
        assert_eq!(reason(err), "expired");
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_pending_and_live_sessions() {
        let (service, users) = setup_with_lifetime(Duration::seconds(-1)).await;
        let user = users
            .get_or_create(66, "Stale")
            .await
            .expect("User create failed");

        // Activated with an already-passed expiry
        let stale = service.create().await.expect("Create failed");
        service
            .activate(&stale.id, user.id, "token")
            .await
            .expect("Activate failed");

        // Pending session: no expiry, must survive the sweep
        let pending = service.create().await.expect("Create failed");

        let removed = service.purge_expired().await.expect("Purge failed");
        assert_eq!(removed, 1);
        assert!(service
            .get(&stale.id)
            .await
            .expect("Get failed")
            .is_none());
        assert!(service
            .get(&pending.id)
            .await
            .expect("Get failed")
            .is_some());
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let (service, _) = setup().await;
        let (tx, rx) = tokio::sync::watch::channel(false);

        // Long interval: the task only ever waits for shutdown here
        let handle = spawn_cleanup_task(
            Arc::new(service),
            std::time::Duration::from_secs(3600),
            rx,
        );

        tx.send(true).expect("Shutdown signal failed");
        handle.await.expect("Cleanup task panicked");
    }

    #[tokio::test]
    async fn test_current_user_none_for_unactivated() {
        let (service, _) = setup().await;

        let session = service.create().await.expect("Create failed");
        let current = service
            .current_user(&session.id)
            .await
            .expect("Lookup failed");
        assert!(current.is_none());

        let current = service.current_user("missing").await.expect("Lookup failed");
        assert!(current.is_none());
    }
}
