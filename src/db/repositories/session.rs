//! Session repository
//!
//! Database operations for OAuth sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! Activation is the only mutation a session ever sees. It is guarded by an
//! `AND activated = 0` predicate so that concurrent callbacks for the same
//! session resolve to exactly one winner at the database level.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new (unactivated) session row
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Activate a session, binding it to a user, provider token and expiry.
    ///
    /// Returns `true` if this call performed the activation, `false` if the
    /// session was already activated (or does not exist).
    async fn activate(
        &self,
        id: &str,
        user_id: i64,
        provider_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete sessions whose expiry has passed, returning the count removed
    async fn delete_expired(&self) -> Result<i64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => {
                create_session_mysql(self.pool.as_mysql().unwrap(), session).await
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_session_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_session_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn activate(
        &self,
        id: &str,
        user_id: i64,
        provider_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                activate_session_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    id,
                    user_id,
                    provider_token,
                    expires_at,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                activate_session_mysql(
                    self.pool.as_mysql().unwrap(),
                    id,
                    user_id,
                    provider_token,
                    expires_at,
                )
                .await
            }
        }
    }

    async fn delete_expired(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_expired_sessions_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                delete_expired_sessions_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, provider_token, user_id, activated, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(&session.provider_token)
    .bind(session.user_id)
    .bind(session.activated)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, provider_token, user_id, activated, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_session_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn activate_session_sqlite(
    pool: &SqlitePool,
    id: &str,
    user_id: i64,
    provider_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET user_id = ?, provider_token = ?, activated = 1, expires_at = ?
        WHERE id = ? AND activated = 0
        "#,
    )
    .bind(user_id)
    .bind(provider_token)
    .bind(expires_at)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to activate session")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_expired_sessions_sqlite(pool: &SqlitePool) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at < ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired sessions")?;

    Ok(result.rows_affected() as i64)
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.get("id"),
        provider_token: row.get("provider_token"),
        user_id: row.get("user_id"),
        activated: row.get("activated"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, provider_token, user_id, activated, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(&session.provider_token)
    .bind(session.user_id)
    .bind(session.activated)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, provider_token, user_id, activated, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_session_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn activate_session_mysql(
    pool: &MySqlPool,
    id: &str,
    user_id: i64,
    provider_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET user_id = ?, provider_token = ?, activated = 1, expires_at = ?
        WHERE id = ? AND activated = 0
        "#,
    )
    .bind(user_id)
    .bind(provider_token)
    .bind(expires_at)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to activate session")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_expired_sessions_mysql(pool: &MySqlPool) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at < ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired sessions")?;

    Ok(result.rows_affected() as i64)
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.get("id"),
        provider_token: row.get("provider_token"),
        user_id: row.get("user_id"),
        activated: row.get("activated"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(pool: &DynDatabasePool) -> i64 {
        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .get_or_create(424242, "Test User")
            .await
            .expect("Failed to create user");
        user.id
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (_pool, repo) = setup_test_repo().await;

        let session = Session::new_unactivated();
        repo.create(&session).await.expect("Failed to create");

        let found = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get")
            .expect("Session should exist");

        assert_eq!(found.id, session.id);
        assert!(!found.activated);
        assert!(found.user_id.is_none());
        assert!(found.provider_token.is_none());
        assert!(found.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_session_returns_none() {
        let (_pool, repo) = setup_test_repo().await;

        let found = repo.get_by_id("does-not-exist").await.expect("Query failed");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_activate_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool).await;

        let session = Session::new_unactivated();
        repo.create(&session).await.expect("Failed to create");

        let expires = Utc::now() + Duration::hours(4);
        let won = repo
            .activate(&session.id, user_id, "provider-token", expires)
            .await
            .expect("Failed to activate");
        assert!(won);

        let found = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get")
            .expect("Session should exist");
        assert!(found.activated);
        assert_eq!(found.user_id, Some(user_id));
        assert_eq!(found.provider_token.as_deref(), Some("provider-token"));
        assert!(found.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_activate_is_exactly_once() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool).await;

        let session = Session::new_unactivated();
        repo.create(&session).await.expect("Failed to create");

        let expires = Utc::now() + Duration::hours(4);
        let first = repo
            .activate(&session.id, user_id, "token-a", expires)
            .await
            .expect("Failed to activate");
        let second = repo
            .activate(&session.id, user_id, "token-b", expires)
            .await
            .expect("Failed to activate");

        assert!(first);
        assert!(!second);

        // The losing call must not overwrite the winner's binding
        let found = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get")
            .expect("Session should exist");
        assert_eq!(found.provider_token.as_deref(), Some("token-a"));
    }

    #[tokio::test]
    async fn test_activate_unknown_session() {
        let (_pool, repo) = setup_test_repo().await;

        let won = repo
            .activate("missing", 1, "token", Utc::now() + Duration::hours(4))
            .await
            .expect("Query failed");
        assert!(!won);
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_unactivated() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool).await;

        // Unactivated session: no expiry, must survive cleanup
        let pending = Session::new_unactivated();
        repo.create(&pending).await.expect("Failed to create");

        // Activated session already past its expiry
        let stale = Session::new_unactivated();
        repo.create(&stale).await.expect("Failed to create");
        repo.activate(&stale.id, user_id, "token", Utc::now() - Duration::hours(1))
            .await
            .expect("Failed to activate");

        let removed = repo.delete_expired().await.expect("Cleanup failed");
        assert_eq!(removed, 1);

        assert!(repo
            .get_by_id(&pending.id)
            .await
            .expect("Query failed")
            .is_some());
        assert!(repo
            .get_by_id(&stale.id)
            .await
            .expect("Query failed")
            .is_none());
    }
}
