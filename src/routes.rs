use axum::{
    routing::{get, post},
    Router,
};

use crate::{auth, billing_events, predict, usage_api};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/register", post(auth::register_account))
        .route("/api/login", post(auth::login_account))
        .route("/api/logout", post(auth::logout_account))
        .route("/api/me", get(auth::current_account))
        .route("/api/usage", get(usage_api::usage_summary))
        .route("/api/usage/history", get(usage_api::usage_history))
        .route("/api/predict", post(predict::predict))
        .route("/api/predictions", get(predict::list_predictions))
        .route("/api/webhooks/billing", post(billing_events::billing_webhook))
}
