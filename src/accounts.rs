use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Subscription tier, totally ordered by entitlement (FREE < BASIC < PREMIUM).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "subscription_tier", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Premium,
}

impl SubscriptionTier {
    /// Billable actions allowed per account per UTC calendar day.
    pub fn daily_limit(self) -> i64 {
        match self {
            SubscriptionTier::Free => 3,
            SubscriptionTier::Basic => 20,
            SubscriptionTier::Premium => 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity resolved once at the request boundary and passed explicitly into
/// the usage meter and prediction gateway.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedPrincipal {
    pub account_id: Uuid,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
}

impl Account {
    pub fn principal(&self) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            account_id: self.id,
            tier: self.subscription_tier,
            status: self.subscription_status,
        }
    }
}

/// Storage contract for the entitlement table. Reads and single-row atomic
/// writes only; tier transitions are decided by the billing event handler.
#[derive(Clone)]
pub struct AccountStore {
    pool: PgPool,
}

impl AccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        email: &str,
        display_name: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, display_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn by_id(&self, id: Uuid) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn by_email(&self, email: &str) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn by_billing_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE billing_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Set tier and status together as one row update. Assignments are
    /// absolute, so replaying the same billing event is a no-op.
    pub async fn set_subscription(
        &self,
        account_id: Uuid,
        tier: SubscriptionTier,
        status: SubscriptionStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET subscription_tier = $2, subscription_status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(tier)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bind the payment-provider customer reference on first checkout. An
    /// already-bound reference is left untouched.
    pub async fn bind_billing_customer(
        &self,
        account_id: Uuid,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET billing_customer_id = $2, updated_at = NOW()
            WHERE id = $1 AND billing_customer_id IS NULL
            "#,
        )
        .bind(account_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
