use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One name/value pair from the submitted feature bag, echoed back to the
/// caller and kept with the stored result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseProperty {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredPrediction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub price: f64,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Prediction history. Best-effort audit data; callers treat write failures
/// as non-fatal.
#[derive(Clone)]
pub struct PredictionStore {
    pool: PgPool,
}

impl PredictionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        account_id: Uuid,
        price: f64,
        properties: &[HouseProperty],
    ) -> Result<StoredPrediction, sqlx::Error> {
        sqlx::query_as::<_, StoredPrediction>(
            r#"
            INSERT INTO predictions (id, account_id, price, properties)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(price)
        .bind(serde_json::json!(properties))
        .fetch_one(&self.pool)
        .await
    }

    pub async fn recent(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredPrediction>, sqlx::Error> {
        sqlx::query_as::<_, StoredPrediction>(
            r#"
            SELECT * FROM predictions
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
