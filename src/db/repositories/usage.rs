//! Usage repository
//!
//! Persistence for drained usage counter readings.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::UsageReading;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Usage repository trait
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Persist a drained usage reading
    async fn insert(&self, reading: &UsageReading) -> Result<()>;

    /// List all readings in chronological order
    async fn list(&self) -> Result<Vec<UsageReading>>;
}

/// SQLx-based usage repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUsageRepository {
    pool: DynDatabasePool,
}

impl SqlxUsageRepository {
    /// Create a new SQLx usage repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UsageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UsageRepository for SqlxUsageRepository {
    async fn insert(&self, reading: &UsageReading) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                insert_reading_sqlite(self.pool.as_sqlite().unwrap(), reading).await
            }
            DatabaseDriver::Mysql => {
                insert_reading_mysql(self.pool.as_mysql().unwrap(), reading).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<UsageReading>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_readings_sqlite(self.pool.as_sqlite().unwrap()).await,
            DatabaseDriver::Mysql => list_readings_mysql(self.pool.as_mysql().unwrap()).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_reading_sqlite(pool: &SqlitePool, reading: &UsageReading) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO usage_readings (taken_at, request_count)
        VALUES (?, ?)
        "#,
    )
    .bind(reading.taken_at)
    .bind(reading.request_count)
    .execute(pool)
    .await
    .context("Failed to insert usage reading")?;

    Ok(())
}

async fn list_readings_sqlite(pool: &SqlitePool) -> Result<Vec<UsageReading>> {
    let rows = sqlx::query(
        r#"
        SELECT taken_at, request_count
        FROM usage_readings
        ORDER BY taken_at
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list usage readings")?;

    Ok(rows
        .iter()
        .map(|row| UsageReading {
            taken_at: row.get("taken_at"),
            request_count: row.get("request_count"),
        })
        .collect())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_reading_mysql(pool: &MySqlPool, reading: &UsageReading) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO usage_readings (taken_at, request_count)
        VALUES (?, ?)
        "#,
    )
    .bind(reading.taken_at)
    .bind(reading.request_count)
    .execute(pool)
    .await
    .context("Failed to insert usage reading")?;

    Ok(())
}

async fn list_readings_mysql(pool: &MySqlPool) -> Result<Vec<UsageReading>> {
    let rows = sqlx::query(
        r#"
        SELECT taken_at, request_count
        FROM usage_readings
        ORDER BY taken_at
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list usage readings")?;

    Ok(rows
        .iter()
        .map(|row| UsageReading {
            taken_at: row.get("taken_at"),
            request_count: row.get("request_count"),
        })
        .collect())
}
