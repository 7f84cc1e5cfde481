use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::accounts::SubscriptionTier;

/// One row per (account, UTC calendar day). `query_count` only grows within
/// a day; past days are immutable audit history.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyUsageRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub day: NaiveDate,
    pub query_count: i64,
    pub tier: SubscriptionTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time admission answer for one account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
    pub can_use: bool,
    pub subscription_type: SubscriptionTier,
    pub reset_date: DateTime<Utc>,
}

/// Decides whether one more billable action is allowed today and durably
/// records consumption against the daily quota.
///
/// The admission check and the increment are not serialized across requests:
/// two concurrent requests can both pass [`evaluate`](Self::evaluate) at
/// `remaining = 1` and both record, leaving `used = limit + 1` for the day.
/// The limit is soft by that bounded margin; the increment itself is a single
/// atomic upsert, so counts are never lost.
#[derive(Clone)]
pub struct UsageMeter {
    pool: PgPool,
}

impl UsageMeter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pure read. An absent row counts as zero usage; the limit is always
    /// recomputed from the caller's current tier, so a mid-day tier change
    /// is reflected immediately without touching recorded counts.
    pub async fn evaluate(
        &self,
        account_id: Uuid,
        tier: SubscriptionTier,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, sqlx::Error> {
        let day = now.date_naive();
        let used: i64 = sqlx::query_scalar(
            "SELECT query_count FROM usage_records WHERE account_id = $1 AND day = $2",
        )
        .bind(account_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or(0);

        let limit = tier.daily_limit();
        let remaining = (limit - used).max(0);
        Ok(UsageSnapshot {
            limit,
            used,
            remaining,
            can_use: remaining > 0,
            subscription_type: tier,
            reset_date: next_utc_midnight(now),
        })
    }

    /// Increment today's count by exactly one. The upsert is a single atomic
    /// statement, so concurrent calls for the same account and day are all
    /// reflected in the stored count.
    pub async fn record_consumption(
        &self,
        account_id: Uuid,
        tier: SubscriptionTier,
        now: DateTime<Utc>,
    ) -> Result<DailyUsageRecord, sqlx::Error> {
        sqlx::query_as::<_, DailyUsageRecord>(
            r#"
            INSERT INTO usage_records (id, account_id, day, query_count, tier)
            VALUES ($1, $2, $3, 1, $4)
            ON CONFLICT (account_id, day)
            DO UPDATE SET
                query_count = usage_records.query_count + 1,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(now.date_naive())
        .bind(tier)
        .fetch_one(&self.pool)
        .await
    }

    /// Recent daily records, newest first. Audit/history only.
    pub async fn history(
        &self,
        account_id: Uuid,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyUsageRecord>, sqlx::Error> {
        let since = now.date_naive() - Duration::days(days);
        sqlx::query_as::<_, DailyUsageRecord>(
            r#"
            SELECT * FROM usage_records
            WHERE account_id = $1 AND day > $2
            ORDER BY day DESC
            "#,
        )
        .bind(account_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }
}

/// Start of the next UTC calendar day, when every daily quota resets.
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap())
}
