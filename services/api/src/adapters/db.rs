//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ViewingLedger` and `ThresholdSource` ports from the core crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use ambassador_core::{
    PortError, PortResult, ThresholdConfig, ThresholdSource, ViewedDocumentEntry, ViewingLedger,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::adapters::ThresholdStore;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the ledger and threshold ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ViewedDocumentRecord {
    customer_id: String,
    document_id: String,
    last_viewed_at: DateTime<Utc>,
}
impl ViewedDocumentRecord {
    fn to_domain(self) -> ViewedDocumentEntry {
        ViewedDocumentEntry {
            customer_id: self.customer_id,
            document_id: self.document_id,
            last_viewed_at: self.last_viewed_at,
        }
    }
}

#[derive(FromRow)]
struct ThresholdRecord {
    duration_50: i32,
    duration_100: i32,
    milestone_50_enabled: bool,
    cooldown_secs: i32,
}
impl ThresholdRecord {
    /// Converts a config into column values, rejecting values the INTEGER columns cannot hold.
    fn from_domain(config: &ThresholdConfig) -> PortResult<Self> {
        let to_column = |value: u32, column: &str| {
            i32::try_from(value).map_err(|_| {
                PortError::Rejected(format!("{} is too large: {}", column, value))
            })
        };
        Ok(Self {
            duration_50: to_column(config.duration50, "duration_50")?,
            duration_100: to_column(config.duration100, "duration_100")?,
            milestone_50_enabled: config.milestone50_enabled,
            cooldown_secs: to_column(config.cooldown_secs, "cooldown_secs")?,
        })
    }

    fn to_domain(self) -> PortResult<ThresholdConfig> {
        let non_negative = |value: i32, column: &str| {
            u32::try_from(value)
                .map_err(|_| PortError::Unexpected(format!("{} is negative: {}", column, value)))
        };
        Ok(ThresholdConfig {
            duration50: non_negative(self.duration_50, "duration_50")?,
            duration100: non_negative(self.duration_100, "duration_100")?,
            milestone50_enabled: self.milestone_50_enabled,
            cooldown_secs: non_negative(self.cooldown_secs, "cooldown_secs")?,
        })
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl ThresholdStore for DbAdapter {
    /// Stores the threshold config that every new viewing session will read.
    async fn save_threshold_config(&self, config: &ThresholdConfig) -> PortResult<()> {
        let record = ThresholdRecord::from_domain(config)?;
        sqlx::query(
            "INSERT INTO threshold_config (id, duration_50, duration_100, milestone_50_enabled, cooldown_secs, updated_at) \
             VALUES (1, $1, $2, $3, $4, NOW()) \
             ON CONFLICT (id) DO UPDATE SET duration_50 = EXCLUDED.duration_50, \
             duration_100 = EXCLUDED.duration_100, milestone_50_enabled = EXCLUDED.milestone_50_enabled, \
             cooldown_secs = EXCLUDED.cooldown_secs, updated_at = NOW()",
        )
        .bind(record.duration_50)
        .bind(record.duration_100)
        .bind(record.milestone_50_enabled)
        .bind(record.cooldown_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ThresholdSource for DbAdapter {
    async fn threshold_config(&self) -> PortResult<ThresholdConfig> {
        let record = sqlx::query_as::<_, ThresholdRecord>(
            "SELECT duration_50, duration_100, milestone_50_enabled, cooldown_secs FROM threshold_config WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound("Threshold config has not been set".to_string())
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        record.to_domain()
    }
}

#[async_trait]
impl ViewingLedger for DbAdapter {
    async fn last_viewed(
        &self,
        customer_id: &str,
        document_id: &str,
    ) -> PortResult<Option<DateTime<Utc>>> {
        let last_viewed_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_viewed_at FROM viewed_documents WHERE customer_id = $1 AND document_id = $2",
        )
        .bind(customer_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(last_viewed_at)
    }

    async fn set_last_viewed(
        &self,
        customer_id: &str,
        document_id: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO viewed_documents (customer_id, document_id, last_viewed_at) VALUES ($1, $2, $3) \
             ON CONFLICT (customer_id, document_id) DO UPDATE SET last_viewed_at = EXCLUDED.last_viewed_at",
        )
        .bind(customer_id)
        .bind(document_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn entries(&self, customer_id: &str) -> PortResult<Vec<ViewedDocumentEntry>> {
        let records = sqlx::query_as::<_, ViewedDocumentRecord>(
            "SELECT customer_id, document_id, last_viewed_at FROM viewed_documents WHERE customer_id = $1 ORDER BY last_viewed_at DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let entries = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(entries)
    }

    async fn clear(&self, customer_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM viewed_documents WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}
