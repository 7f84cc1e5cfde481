use axum::{extract::Extension, Json};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::error;

use crate::accounts::{AccountStore, SubscriptionStatus, SubscriptionTier};
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::usage::{DailyUsageRecord, UsageMeter, UsageSnapshot};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub usage: UsageSnapshot,
    pub subscription: SubscriptionInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub r#type: SubscriptionTier,
    pub status: SubscriptionStatus,
}

/// `GET /api/usage`. Read-only admission check; calling it any number of
/// times changes nothing.
pub async fn usage_summary(
    Extension(pool): Extension<PgPool>,
    AuthUser { account_id }: AuthUser,
) -> AppResult<Json<UsageResponse>> {
    let store = AccountStore::new(pool.clone());
    let account = store
        .by_id(account_id)
        .await
        .map_err(|e| {
            error!(?e, "DB error while resolving account for usage");
            AppError::Db(e)
        })?
        .ok_or(AppError::Unauthorized)?;
    let principal = account.principal();

    let meter = UsageMeter::new(pool);
    let usage = meter
        .evaluate(principal.account_id, principal.tier, Utc::now())
        .await?;
    Ok(Json(UsageResponse {
        usage,
        subscription: SubscriptionInfo {
            r#type: principal.tier,
            status: principal.status,
        },
    }))
}

/// `GET /api/usage/history`. The last 30 daily records, newest first.
pub async fn usage_history(
    Extension(pool): Extension<PgPool>,
    AuthUser { account_id }: AuthUser,
) -> AppResult<Json<Vec<DailyUsageRecord>>> {
    let meter = UsageMeter::new(pool);
    let records = meter.history(account_id, 30, Utc::now()).await?;
    Ok(Json(records))
}
