use axum::{extract::Extension, http::StatusCode};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::accounts::{AccountStore, SubscriptionStatus, SubscriptionTier};
use crate::config;
use crate::error::{AppError, AppResult};

/// Lifecycle notification from the payment provider, reduced to the three
/// transitions the entitlement table understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// First checkout finished; bind the provider customer reference.
    CheckoutCompleted {
        account_id: Uuid,
        customer_id: String,
    },
    /// Subscription created or updated (plan change included).
    SubscriptionChanged {
        customer_id: String,
        price_id: String,
        active: bool,
    },
    /// Subscription ended; account falls back to the free tier.
    SubscriptionDeleted { customer_id: String },
    /// Recognized envelope, no entitlement effect.
    Ignored { event_type: String },
}

/// Verify the provider's `t=<unix>,v1=<hex>` signature header: HMAC-SHA256
/// over `"{t}.{payload}"` keyed with the webhook secret.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> Result<(), AppError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            match key {
                "t" => timestamp = Some(value),
                "v1" => signature = Some(value),
                _ => {}
            }
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(v)) => (t, v),
        _ => return Err(AppError::BadRequest("Malformed signature header".into())),
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can use any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    if expected != signature {
        return Err(AppError::BadRequest("Invalid signature".into()));
    }
    Ok(())
}

/// Map a provider price identifier to a paid tier. Only the configured
/// premium price yields PREMIUM; everything else is BASIC.
pub fn tier_for_price(price_id: &str, premium_price_id: Option<&str>) -> SubscriptionTier {
    match premium_price_id {
        Some(premium) if price_id == premium => SubscriptionTier::Premium,
        _ => SubscriptionTier::Basic,
    }
}

/// Reduce a verified provider envelope to a [`BillingEvent`]. Unrecognized
/// event types are accepted and ignored; delivery is at-least-once so the
/// parser never treats them as failures.
pub fn parse_event(payload: &[u8]) -> Result<BillingEvent, AppError> {
    let envelope: Value = serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {e}")))?;
    let event_type = envelope["type"]
        .as_str()
        .ok_or_else(|| AppError::BadRequest("Missing event type".into()))?;
    let object = &envelope["data"]["object"];

    match event_type {
        "checkout.session.completed" => {
            let account_id = object["metadata"]["accountId"]
                .as_str()
                .and_then(|raw| Uuid::parse_str(raw).ok());
            let customer_id = object["customer"].as_str();
            match (account_id, customer_id) {
                (Some(account_id), Some(customer_id)) => Ok(BillingEvent::CheckoutCompleted {
                    account_id,
                    customer_id: customer_id.to_string(),
                }),
                _ => {
                    // A session without our metadata is not ours to process.
                    error!(%event_type, "checkout session missing account metadata");
                    Ok(BillingEvent::Ignored {
                        event_type: event_type.to_string(),
                    })
                }
            }
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let customer_id = object["customer"].as_str().unwrap_or_default().to_string();
            let price_id = object["items"]["data"][0]["price"]["id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let active = object["status"].as_str() == Some("active");
            Ok(BillingEvent::SubscriptionChanged {
                customer_id,
                price_id,
                active,
            })
        }
        "customer.subscription.deleted" => Ok(BillingEvent::SubscriptionDeleted {
            customer_id: object["customer"].as_str().unwrap_or_default().to_string(),
        }),
        _ => Ok(BillingEvent::Ignored {
            event_type: event_type.to_string(),
        }),
    }
}

/// Apply one event to the entitlement table. Every transition is an absolute
/// assignment, so duplicate deliveries leave state unchanged. An unknown
/// customer reference is logged and dropped, never an error: the provider
/// retries on failure and a stray event must not wedge the endpoint.
pub async fn apply_event(store: &AccountStore, event: BillingEvent) -> Result<(), sqlx::Error> {
    match event {
        BillingEvent::CheckoutCompleted {
            account_id,
            customer_id,
        } => {
            store.bind_billing_customer(account_id, &customer_id).await?;
            info!(%account_id, %customer_id, "billing customer bound");
            Ok(())
        }
        BillingEvent::SubscriptionChanged {
            customer_id,
            price_id,
            active,
        } => {
            let Some(account) = store.by_billing_customer(&customer_id).await? else {
                error!(%customer_id, "no account for billing customer");
                return Ok(());
            };
            let tier = tier_for_price(&price_id, config::BILLING_PREMIUM_PRICE_ID.as_deref());
            let status = if active {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Canceled
            };
            store.set_subscription(account.id, tier, status).await?;
            info!(account_id = %account.id, ?tier, ?status, "subscription updated");
            Ok(())
        }
        BillingEvent::SubscriptionDeleted { customer_id } => {
            let Some(account) = store.by_billing_customer(&customer_id).await? else {
                error!(%customer_id, "no account for billing customer");
                return Ok(());
            };
            store
                .set_subscription(account.id, SubscriptionTier::Free, SubscriptionStatus::Canceled)
                .await?;
            info!(account_id = %account.id, "subscription canceled");
            Ok(())
        }
        BillingEvent::Ignored { event_type } => {
            info!(%event_type, "ignoring billing event");
            Ok(())
        }
    }
}

/// `POST /api/webhooks/billing`. Signature failures are rejected before any
/// parsing; everything past the signature gate answers 200 so the provider
/// stops redelivering.
pub async fn billing_webhook(
    Extension(pool): Extension<PgPool>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> AppResult<StatusCode> {
    let signature = headers
        .get("billing-signature")
        .or_else(|| headers.get("stripe-signature"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing signature".into()))?;
    verify_signature(&body, signature, config::BILLING_WEBHOOK_SECRET.as_str())?;

    let event = parse_event(&body)?;
    let store = AccountStore::new(pool);
    apply_event(&store, event).await?;
    Ok(StatusCode::OK)
}
