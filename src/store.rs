//! Persistence for prediction history and subscription state.
//!
//! The pipeline and the billing reconciler only see the [`PredictionStore`] and
//! [`SubscriptionStore`] traits. [`SqliteStore`] implements both on one pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use std::str::FromStr;
use tracing::{debug, info};

use crate::{
    errors::PredictorError,
    models::{NewPrediction, PredictionRecord, SubscriptionState, SubscriptionStatus},
};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        search_params TEXT NOT NULL,
        domains TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_predictions_user ON predictions (user_id, created_at)",
    "CREATE TABLE IF NOT EXISTS subscriptions (
        user_id INTEGER PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'inactive',
        stripe_customer_id TEXT UNIQUE,
        stripe_subscription_id TEXT,
        price_id TEXT,
        created_at TEXT NOT NULL,
        current_period_end TEXT,
        last_payment_date TEXT,
        last_payment_amount REAL
    )",
];

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Stores a finished prediction and returns its id.
    async fn append(&self, prediction: NewPrediction) -> Result<i64, PredictorError>;

    async fn prediction(&self, id: i64) -> Result<Option<PredictionRecord>, PredictorError>;

    /// Newest first.
    async fn predictions_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<PredictionRecord>, PredictorError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn subscription(&self, user_id: i64) -> Result<Option<SubscriptionState>, PredictorError>;

    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<i64>, PredictorError>;

    /// Associates a billing customer with a user, creating an inactive row if needed.
    async fn link_customer(
        &self,
        user_id: i64,
        customer_id: &str,
    ) -> Result<SubscriptionState, PredictorError>;

    async fn save_subscription(&self, state: &SubscriptionState) -> Result<(), PredictorError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, PredictorError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every in-memory connection is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(if in_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        info!("Connected to database {}", database_url);
        Ok(Self { pool })
    }

    /// An empty, migrated in-memory store.
    pub async fn in_memory() -> Result<Self, PredictorError> {
        let store = Self::connect("sqlite::memory:").await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), PredictorError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn prediction_from_row(row: &SqliteRow) -> Result<PredictionRecord, PredictorError> {
    let search_params: String = row.try_get("search_params")?;
    let domains: String = row.try_get("domains")?;

    Ok(PredictionRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        search_params: serde_json::from_str(&search_params)
            .map_err(|e| PredictorError::Storage(format!("corrupt search_params: {}", e)))?,
        domains: serde_json::from_str(&domains)
            .map_err(|e| PredictorError::Storage(format!("corrupt domains: {}", e)))?,
        created_at: row.try_get("created_at")?,
    })
}

fn subscription_from_row(row: &SqliteRow) -> Result<SubscriptionState, PredictorError> {
    let status: String = row.try_get("status")?;

    Ok(SubscriptionState {
        user_id: row.try_get("user_id")?,
        status: SubscriptionStatus::from_str(&status).map_err(PredictorError::Storage)?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        stripe_subscription_id: row.try_get("stripe_subscription_id")?,
        price_id: row.try_get("price_id")?,
        created_at: row.try_get("created_at")?,
        current_period_end: row.try_get::<Option<DateTime<Utc>>, _>("current_period_end")?,
        last_payment_date: row.try_get::<Option<DateTime<Utc>>, _>("last_payment_date")?,
        last_payment_amount: row.try_get("last_payment_amount")?,
    })
}

#[async_trait]
impl PredictionStore for SqliteStore {
    async fn append(&self, prediction: NewPrediction) -> Result<i64, PredictorError> {
        let search_params = serde_json::to_string(&prediction.search_params)?;
        let domains = serde_json::to_string(&prediction.domains)?;

        let result = sqlx::query(
            "INSERT INTO predictions (user_id, search_params, domains, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(prediction.user_id)
        .bind(search_params)
        .bind(domains)
        .bind(prediction.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn prediction(&self, id: i64) -> Result<Option<PredictionRecord>, PredictorError> {
        let row = sqlx::query("SELECT * FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(prediction_from_row).transpose()
    }

    async fn predictions_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<PredictionRecord>, PredictorError> {
        let rows = sqlx::query(
            "SELECT * FROM predictions WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(prediction_from_row).collect()
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn subscription(&self, user_id: i64) -> Result<Option<SubscriptionState>, PredictorError> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<i64>, PredictorError> {
        let row = sqlx::query("SELECT user_id FROM subscriptions WHERE stripe_customer_id = ?")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("user_id")?),
            None => None,
        })
    }

    async fn link_customer(
        &self,
        user_id: i64,
        customer_id: &str,
    ) -> Result<SubscriptionState, PredictorError> {
        sqlx::query(
            "INSERT INTO subscriptions (user_id, status, stripe_customer_id, created_at)
             VALUES (?, 'inactive', ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET stripe_customer_id = excluded.stripe_customer_id",
        )
        .bind(user_id)
        .bind(customer_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.subscription(user_id)
            .await?
            .ok_or_else(|| PredictorError::Storage(format!("subscription row for user {} vanished", user_id)))
    }

    async fn save_subscription(&self, state: &SubscriptionState) -> Result<(), PredictorError> {
        sqlx::query(
            "INSERT INTO subscriptions (
                user_id, status, stripe_customer_id, stripe_subscription_id, price_id,
                created_at, current_period_end, last_payment_date, last_payment_amount
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                status = excluded.status,
                stripe_customer_id = excluded.stripe_customer_id,
                stripe_subscription_id = excluded.stripe_subscription_id,
                price_id = excluded.price_id,
                current_period_end = excluded.current_period_end,
                last_payment_date = excluded.last_payment_date,
                last_payment_amount = excluded.last_payment_amount",
        )
        .bind(state.user_id)
        .bind(state.status.as_str())
        .bind(state.stripe_customer_id.as_deref())
        .bind(state.stripe_subscription_id.as_deref())
        .bind(state.price_id.as_deref())
        .bind(state.created_at)
        .bind(state.current_period_end)
        .bind(state.last_payment_date)
        .bind(state.last_payment_amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
