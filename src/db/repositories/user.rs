//! User repository
//!
//! Database operations for users keyed by their OAuth provider identity.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Look up a user by provider identity, creating the row on first sight.
    ///
    /// The display name is refreshed from the provider profile on every call
    /// so renames propagate on the next login.
    async fn get_or_create(&self, provider_id: i64, display_name: &str) -> Result<User>;

    /// Get a user by local ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Count registered users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn get_or_create(&self, provider_id: i64, display_name: &str) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_or_create_user_sqlite(self.pool.as_sqlite().unwrap(), provider_id, display_name)
                    .await
            }
            DatabaseDriver::Mysql => {
                get_or_create_user_mysql(self.pool.as_mysql().unwrap(), provider_id, display_name)
                    .await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.as_sqlite().unwrap()).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.as_mysql().unwrap()).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_or_create_user_sqlite(
    pool: &SqlitePool,
    provider_id: i64,
    display_name: &str,
) -> Result<User> {
    // Concurrent callbacks for the same new provider identity race each
    // other here; the upsert makes every caller converge on one row.
    let user = User::new(provider_id, display_name.to_string());
    sqlx::query(
        r#"
        INSERT INTO users (provider_id, display_name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(provider_id) DO UPDATE SET display_name = excluded.display_name
        "#,
    )
    .bind(user.provider_id)
    .bind(&user.display_name)
    .bind(user.created_at)
    .execute(pool)
    .await
    .context("Failed to upsert user")?;

    let row = sqlx::query(
        r#"
        SELECT id, provider_id, display_name, created_at
        FROM users
        WHERE provider_id = ?
        "#,
    )
    .bind(provider_id)
    .fetch_one(pool)
    .await
    .context("Failed to load user after upsert")?;

    row_to_user_sqlite(&row)
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, provider_id, display_name, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_or_create_user_mysql(
    pool: &MySqlPool,
    provider_id: i64,
    display_name: &str,
) -> Result<User> {
    // Same convergence guarantee as the SQLite arm
    let user = User::new(provider_id, display_name.to_string());
    sqlx::query(
        r#"
        INSERT INTO users (provider_id, display_name, created_at)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE display_name = VALUES(display_name)
        "#,
    )
    .bind(user.provider_id)
    .bind(&user.display_name)
    .bind(user.created_at)
    .execute(pool)
    .await
    .context("Failed to upsert user")?;

    let row = sqlx::query(
        r#"
        SELECT id, provider_id, display_name, created_at
        FROM users
        WHERE provider_id = ?
        "#,
    )
    .bind(provider_id)
    .fetch_one(pool)
    .await
    .context("Failed to load user after upsert")?;

    row_to_user_mysql(&row)
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, provider_id, display_name, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    #[tokio::test]
    async fn test_get_or_create_creates_once() {
        let repo = setup_test_repo().await;

        let first = repo
            .get_or_create(1001, "Grace")
            .await
            .expect("Failed to create");
        assert!(first.id > 0);
        assert_eq!(first.provider_id, 1001);

        let second = repo
            .get_or_create(1001, "Grace")
            .await
            .expect("Failed to get");
        assert_eq!(second.id, first.id);

        assert_eq!(repo.count().await.expect("Count failed"), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_refreshes_display_name() {
        let repo = setup_test_repo().await;

        let user = repo
            .get_or_create(1002, "Old Name")
            .await
            .expect("Failed to create");
        let renamed = repo
            .get_or_create(1002, "New Name")
            .await
            .expect("Failed to get");

        assert_eq!(renamed.id, user.id);
        assert_eq!(renamed.display_name, "New Name");

        let found = repo
            .get_by_id(user.id)
            .await
            .expect("Query failed")
            .expect("User should exist");
        assert_eq!(found.display_name, "New Name");
    }

    #[tokio::test]
    async fn test_count_tracks_distinct_provider_ids() {
        let repo = setup_test_repo().await;

        repo.get_or_create(1, "A").await.expect("Failed to create");
        repo.get_or_create(2, "B").await.expect("Failed to create");
        repo.get_or_create(1, "A").await.expect("Failed to get");

        assert_eq!(repo.count().await.expect("Count failed"), 2);
    }

    #[tokio::test]
    async fn test_get_by_id_unknown() {
        let repo = setup_test_repo().await;
        let found = repo.get_by_id(99).await.expect("Query failed");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_converges_on_one_row() {
        let repo = Arc::new(setup_test_repo().await);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.get_or_create(4242, "Duplicate Caller").await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let user = handle
                .await
                .expect("Task panicked")
                .expect("Upsert should never fail on a duplicate");
            ids.push(user.id);
        }

        // Every caller resolved the same user
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(repo.count().await.expect("Count failed"), 1);
    }
}
