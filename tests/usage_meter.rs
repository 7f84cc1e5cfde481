use casaval_backend::accounts::{AccountStore, SubscriptionTier};
use casaval_backend::usage::UsageMeter;
use chrono::{Duration, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_account(pool: &PgPool, email: &str) -> Uuid {
    let store = AccountStore::new(pool.clone());
    let account = store
        .create(email, Some("Test Account"), Some("hashed"))
        .await
        .unwrap();
    account.id
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn fresh_account_has_full_quota(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "fresh@example.com").await;
    let meter = UsageMeter::new(pool);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
    let snapshot = meter
        .evaluate(account_id, SubscriptionTier::Free, now)
        .await
        .unwrap();

    assert_eq!(snapshot.limit, 3);
    assert_eq!(snapshot.used, 0);
    assert_eq!(snapshot.remaining, 3);
    assert!(snapshot.can_use);
    assert_eq!(
        snapshot.reset_date,
        Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
    );
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn evaluate_never_writes(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "readonly@example.com").await;
    let meter = UsageMeter::new(pool.clone());

    let now = Utc::now();
    for _ in 0..5 {
        meter
            .evaluate(account_id, SubscriptionTier::Basic, now)
            .await
            .unwrap();
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn consumption_decrements_remaining_until_exhausted(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "exhaust@example.com").await;
    let meter = UsageMeter::new(pool);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    for expected_used in 1..=3 {
        meter
            .record_consumption(account_id, SubscriptionTier::Free, now)
            .await
            .unwrap();
        let snapshot = meter
            .evaluate(account_id, SubscriptionTier::Free, now)
            .await
            .unwrap();
        assert_eq!(snapshot.used, expected_used);
        assert_eq!(snapshot.remaining, 3 - expected_used);
    }

    let snapshot = meter
        .evaluate(account_id, SubscriptionTier::Free, now)
        .await
        .unwrap();
    assert_eq!(snapshot.used, 3);
    assert_eq!(snapshot.remaining, 0);
    assert!(!snapshot.can_use);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_increments_are_all_reflected(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "racing@example.com").await;
    let meter = UsageMeter::new(pool);

    let now = Utc::now();
    let (a, b) = tokio::join!(
        meter.record_consumption(account_id, SubscriptionTier::Basic, now),
        meter.record_consumption(account_id, SubscriptionTier::Basic, now),
    );
    a.unwrap();
    b.unwrap();

    let snapshot = meter
        .evaluate(account_id, SubscriptionTier::Basic, now)
        .await
        .unwrap();
    assert_eq!(snapshot.used, 2, "no increment may be lost");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn day_rollover_starts_a_fresh_count(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "rollover@example.com").await;
    let meter = UsageMeter::new(pool);

    let day_one = Utc.with_ymd_and_hms(2025, 1, 1, 23, 50, 0).unwrap();
    meter
        .record_consumption(account_id, SubscriptionTier::Free, day_one)
        .await
        .unwrap();

    let day_two = day_one + Duration::hours(1);
    let snapshot = meter
        .evaluate(account_id, SubscriptionTier::Free, day_two)
        .await
        .unwrap();
    assert_eq!(snapshot.used, 0);
    assert_eq!(snapshot.remaining, 3);

    let history = meter.history(account_id, 30, day_two).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].query_count, 1);
    assert_eq!(history[0].day, day_one.date_naive());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn downgrade_shrinks_remaining_without_rewriting_history(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "downgrade@example.com").await;
    let meter = UsageMeter::new(pool);

    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    for _ in 0..2 {
        meter
            .record_consumption(account_id, SubscriptionTier::Premium, now)
            .await
            .unwrap();
    }

    let premium = meter
        .evaluate(account_id, SubscriptionTier::Premium, now)
        .await
        .unwrap();
    assert_eq!(premium.limit, 50);
    assert_eq!(premium.remaining, 48);

    // Cancellation dropped the account to FREE; the two consumed actions
    // stand and the new limit applies immediately.
    let free = meter
        .evaluate(account_id, SubscriptionTier::Free, now)
        .await
        .unwrap();
    assert_eq!(free.limit, 3);
    assert_eq!(free.used, 2);
    assert_eq!(free.remaining, 1);
    assert!(free.can_use);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn upgrade_raises_remaining_mid_day(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let account_id = seed_account(&pool, "upgrade@example.com").await;
    let meter = UsageMeter::new(pool);

    let now = Utc::now();
    for _ in 0..3 {
        meter
            .record_consumption(account_id, SubscriptionTier::Free, now)
            .await
            .unwrap();
    }
    let free = meter
        .evaluate(account_id, SubscriptionTier::Free, now)
        .await
        .unwrap();
    assert!(!free.can_use);

    let basic = meter
        .evaluate(account_id, SubscriptionTier::Basic, now)
        .await
        .unwrap();
    assert_eq!(basic.used, 3);
    assert_eq!(basic.remaining, 17);
    assert!(basic.can_use);
}
