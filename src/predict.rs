use axum::{extract::Extension, Json};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::accounts::AccountStore;
use crate::config;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::predictions::{HouseProperty, PredictionStore, StoredPrediction};
use crate::predictor::PricePredictor;
use crate::usage::{UsageMeter, UsageSnapshot};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub price: f64,
    pub properties: Vec<HouseProperty>,
    pub usage_info: UsageSnapshot,
}

/// `POST /api/predict`. The request-level protocol: resolve the principal,
/// admit against today's quota, call the inference service, then record
/// consumption. A failed inference must not cost quota, so the increment
/// only happens after a successful upstream response.
pub async fn predict(
    Extension(pool): Extension<PgPool>,
    Extension(predictor): Extension<Arc<dyn PricePredictor>>,
    AuthUser { account_id }: AuthUser,
    Json(features): Json<serde_json::Value>,
) -> AppResult<Json<PredictResponse>> {
    let store = AccountStore::new(pool.clone());
    let account = store.by_id(account_id).await?.ok_or(AppError::Unauthorized)?;
    let principal = account.principal();

    let meter = UsageMeter::new(pool.clone());
    let snapshot = meter
        .evaluate(principal.account_id, principal.tier, Utc::now())
        .await?;
    if !snapshot.can_use {
        return Err(AppError::QuotaExceeded(Box::new(snapshot)));
    }

    let price = predictor
        .predict(&features)
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    // The inference succeeded, so the consumption write must complete even
    // if the client disconnects and this handler future is dropped.
    let write = {
        let meter = meter.clone();
        let tier = principal.tier;
        let account_id = principal.account_id;
        tokio::spawn(async move { meter.record_consumption(account_id, tier, Utc::now()).await })
    };
    write
        .await
        .map_err(|e| AppError::Message(format!("usage write aborted: {e}")))??;

    let properties = property_bag(&features);
    let history = PredictionStore::new(pool.clone());
    if let Err(e) = history.save(principal.account_id, price, &properties).await {
        error!(?e, "failed to store prediction history");
    }

    let usage_info = meter
        .evaluate(principal.account_id, principal.tier, Utc::now())
        .await?;
    Ok(Json(PredictResponse {
        price,
        properties,
        usage_info,
    }))
}

/// `GET /api/predictions`. Recent stored results for the caller.
pub async fn list_predictions(
    Extension(pool): Extension<PgPool>,
    AuthUser { account_id }: AuthUser,
) -> AppResult<Json<Vec<StoredPrediction>>> {
    let history = PredictionStore::new(pool);
    let predictions = history
        .recent(account_id, *config::PREDICTION_HISTORY_LIMIT)
        .await?;
    Ok(Json(predictions))
}

fn property_bag(features: &serde_json::Value) -> Vec<HouseProperty> {
    match features.as_object() {
        Some(map) => map
            .iter()
            .map(|(name, value)| HouseProperty {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
        None => Vec::new(),
    }
}
