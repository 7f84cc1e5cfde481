use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config;

/// External ML inference endpoint. Stateless request/response; the gateway
/// treats it as a black box behind this seam.
#[async_trait]
pub trait PricePredictor: Send + Sync {
    async fn predict(&self, features: &Value) -> Result<f64>;
}

/// HTTP client for the inference service's `/predict-app` endpoint.
pub struct HttpPredictor {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPredictor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(config::ML_SERVICE_URL.as_str())
    }
}

#[async_trait]
impl PricePredictor for HttpPredictor {
    async fn predict(&self, features: &Value) -> Result<f64> {
        let response = self
            .client
            .post(format!("{}/predict-app", self.base_url))
            .json(features)
            .send()
            .await
            .map_err(|e| anyhow!("inference service unreachable: {e}"))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("inference response unreadable: {e}"))?;
        if !status.is_success() {
            return Err(anyhow!("inference service returned {status}: {body}"));
        }

        extract_price(&body).ok_or_else(|| anyhow!("inference response missing prediction: {body}"))
    }
}

/// The service answers `{"predictions": [n, ...]}`; some deployments return a
/// bare `{"price": n}`.
fn extract_price(body: &Value) -> Option<f64> {
    body.get("predictions")
        .and_then(|p| p.get(0))
        .or_else(|| body.get("price"))
        .and_then(Value::as_f64)
}
