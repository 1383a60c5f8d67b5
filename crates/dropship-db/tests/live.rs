//! Live integration tests for dropship-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/dropship-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use dropship_core::{
    AffiliateLink, AffiliateLinkStore, CampaignTag, CatalogItem, CatalogStore, CatalogVariant,
    Claim, ErrorKind, ExternalId, JobError, JobStatus, JobStore, StoreError,
};
use dropship_db::{get_catalog_item, PgAffiliateLinkStore, PgCatalogStore, PgJobStore};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ext(raw: &str) -> ExternalId {
    ExternalId::parse(raw).unwrap()
}

fn catalog_item(raw: &str, title: &str) -> CatalogItem {
    CatalogItem {
        external_id: ext(raw),
        sku: format!("ALI-{raw}"),
        title: title.to_string(),
        description: None,
        brand: Some("Acme".to_string()),
        specs: BTreeMap::from([("Material".to_string(), "Silicone".to_string())]),
        source_price: Decimal::new(999, 2),
        price: Decimal::new(1299, 2),
        currency_code: "USD".to_string(),
        quantity: 50,
        image_urls: vec!["https://img.example/1.jpg".to_string()],
        variants: vec![CatalogVariant {
            sku_id: "1".to_string(),
            attributes: BTreeMap::from([("color".to_string(), "Black".to_string())]),
        }],
        category_id: "15032".to_string(),
        marketplace_id: "EBAY-AU".to_string(),
    }
}

async fn claim_and_publish(store: &PgJobStore) -> dropship_core::ImportJob {
    let job = store.claim_next(Utc::now()).await.unwrap().expect("claimable job");
    store
        .advance(job.claim(), JobStatus::Fetching, JobStatus::Transforming)
        .await
        .unwrap();
    store
        .advance(job.claim(), JobStatus::Transforming, JobStatus::Publishing)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn submit_is_idempotent_while_active(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);

    let first = store.submit(&ext("12345")).await.unwrap();
    let second = store.submit(&ext("12345")).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.job.id, second.job.id);
    assert_eq!(first.job.status, JobStatus::Queued);
    assert_eq!(store.list(10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_submits_converge(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.submit(&ext("777")).await.unwrap()
        }));
    }
    let mut ids = Vec::new();
    let mut created = 0;
    for handle in handles {
        let submission = handle.await.unwrap();
        created += usize::from(submission.created);
        ids.push(submission.job.id);
    }

    assert_eq!(created, 1);
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_is_fifo_and_counts_attempts(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);
    let a = store.submit(&ext("1")).await.unwrap().job;
    let b = store.submit(&ext("2")).await.unwrap().job;

    let first = store.claim_next(Utc::now()).await.unwrap().unwrap();
    let second = store.claim_next(Utc::now()).await.unwrap().unwrap();

    assert_eq!(first.id, a.id);
    assert_eq!(second.id, b.id);
    assert_eq!(first.status, JobStatus::Fetching);
    assert_eq!(first.attempts, 1);
    assert!(store.claim_next(Utc::now()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_wait_is_claimable_only_when_due(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);
    store.submit(&ext("1")).await.unwrap();
    let job = store.claim_next(Utc::now()).await.unwrap().unwrap();

    let due = Utc::now() + Duration::seconds(30);
    let error = JobError::new(ErrorKind::Transient, "fetch timed out");
    let waiting = store
        .schedule_retry(job.claim(), JobStatus::Fetching, &error, due)
        .await
        .unwrap();
    assert_eq!(waiting.status, JobStatus::RetryWait);
    assert_eq!(waiting.last_error, Some(error));

    assert!(store.claim_next(Utc::now()).await.unwrap().is_none());
    let wake = store.next_wakeup().await.unwrap().unwrap();
    assert!((wake - due).num_milliseconds().abs() < 5);

    let again = store
        .claim_next(due + Duration::seconds(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, job.id);
    assert_eq!(again.attempts, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_status_is_a_conflict(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);
    store.submit(&ext("1")).await.unwrap();
    let job = store.claim_next(Utc::now()).await.unwrap().unwrap();

    let err = store
        .advance(job.claim(), JobStatus::Transforming, JobStatus::Publishing)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict { expected: JobStatus::Transforming, .. }
    ));

    let err = store
        .advance(job.claim(), JobStatus::Fetching, JobStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let missing = dropship_core::JobId::new();
    let claim = Claim {
        job_id: missing,
        attempt: 1,
    };
    let err = store
        .advance(claim, JobStatus::Fetching, JobStatus::Transforming)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}

#[sqlx::test(migrations = "../../migrations")]
async fn completion_frees_the_slot(pool: sqlx::PgPool) {
    let jobs = PgJobStore::new(pool.clone());
    let catalog = PgCatalogStore::new(pool);

    let job = jobs.submit(&ext("12345")).await.unwrap().job;
    let published = claim_and_publish(&jobs).await;
    let item_id = catalog.upsert(&catalog_item("12345", "Phone case")).await.unwrap();
    let done = jobs.complete(published.claim(), item_id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.catalog_item_id, Some(item_id));
    assert!(done.last_error.is_none());

    let next = jobs.submit(&ext("12345")).await.unwrap();
    assert!(next.created);
    assert_ne!(next.job.id, job.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn failure_records_the_error(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);
    let job = store.submit(&ext("9")).await.unwrap().job;
    let claimed = store.claim_next(Utc::now()).await.unwrap().unwrap();

    let error = JobError::new(ErrorKind::Permanent, "listing not found");
    let failed = store
        .fail(claimed.claim(), JobStatus::Fetching, &error)
        .await
        .unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.last_error, Some(error));
    assert!(store.get(job.id).await.unwrap().unwrap().status.is_terminal());
}

#[sqlx::test(migrations = "../../migrations")]
async fn recovery_requeues_in_flight_jobs(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);
    store.submit(&ext("1")).await.unwrap();
    store.submit(&ext("2")).await.unwrap();
    let claimed = store.claim_next(Utc::now()).await.unwrap().unwrap();

    assert_eq!(store.recover_in_flight().await.unwrap(), 1);
    let recovered = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, JobStatus::Queued);
    assert_eq!(recovered.attempts, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn reclaimed_job_rejects_its_previous_owner(pool: sqlx::PgPool) {
    let store = PgJobStore::new(pool);
    store.submit(&ext("1")).await.unwrap();
    let first = store.claim_next(Utc::now()).await.unwrap().unwrap();
    store.recover_in_flight().await.unwrap();
    let second = store.claim_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!((first.attempts, second.attempts), (1, 2));

    let err = store
        .advance(first.claim(), JobStatus::Fetching, JobStatus::Transforming)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    let error = JobError::new(ErrorKind::Transient, "fetch timed out");
    let err = store
        .schedule_retry(first.claim(), JobStatus::Fetching, &error, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let moved = store
        .advance(second.claim(), JobStatus::Fetching, JobStatus::Transforming)
        .await
        .unwrap();
    assert_eq!(moved.status, JobStatus::Transforming);
    assert_eq!(moved.attempts, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_completed_skips_active_items(pool: sqlx::PgPool) {
    let jobs = PgJobStore::new(pool.clone());
    let catalog = PgCatalogStore::new(pool);

    for raw in ["1", "2"] {
        jobs.submit(&ext(raw)).await.unwrap();
        let published = claim_and_publish(&jobs).await;
        let item_id = catalog.upsert(&catalog_item(raw, "Thing")).await.unwrap();
        jobs.complete(published.claim(), item_id).await.unwrap();
    }
    jobs.submit(&ext("2")).await.unwrap();

    let cutoff = Utc::now() + Duration::seconds(1);
    let stale = jobs.stale_completed(cutoff, 10).await.unwrap();
    assert_eq!(stale, vec![ext("1")]);

    let none = jobs
        .stale_completed(Utc::now() - Duration::hours(1), 10)
        .await
        .unwrap();
    assert!(none.is_empty());
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_keeps_one_row_per_item(pool: sqlx::PgPool) {
    let catalog = PgCatalogStore::new(pool.clone());

    let first = catalog.upsert(&catalog_item("55", "Old title")).await.unwrap();
    let second = catalog.upsert(&catalog_item("55", "New title")).await.unwrap();
    assert_eq!(first, second);
    assert!(catalog.exists(&ext("55")).await.unwrap());
    assert!(!catalog.exists(&ext("56")).await.unwrap());

    let row = get_catalog_item(&pool, "55").await.unwrap().unwrap();
    assert_eq!(row.title, "New title");
    assert_eq!(row.price, Decimal::new(1299, 2));
    assert_eq!(row.variants.0.len(), 1);
    assert_eq!(row.brand.as_deref(), Some("Acme"));
    assert_eq!(row.specs.0.get("Material").map(String::as_str), Some("Silicone"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

// ---------------------------------------------------------------------------
// Affiliate links
// ---------------------------------------------------------------------------

fn link(seq: u64, created_at: chrono::DateTime<Utc>) -> AffiliateLink {
    AffiliateLink {
        external_id: ext("12345"),
        campaign: CampaignTag::parse("default").unwrap(),
        url: format!("https://s.click.example/deep_link?tc=AFF-{seq:08}"),
        tracking_code: format!("AFF-{seq:08}"),
        affiliate: true,
        created_at,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn tracking_sequence_is_monotonic(pool: sqlx::PgPool) {
    let store = PgAffiliateLinkStore::new(pool);
    let a = store.next_tracking_seq().await.unwrap();
    let b = store.next_tracking_seq().await.unwrap();
    assert_eq!(a, 1);
    assert!(b > a);
}

#[sqlx::test(migrations = "../../migrations")]
async fn live_link_wins_over_new_insert(pool: sqlx::PgPool) {
    let store = PgAffiliateLinkStore::new(pool);
    let now = Utc::now();

    let first = store.insert_or_get(link(1, now), None).await.unwrap();
    let second = store.insert_or_get(link(2, now), None).await.unwrap();
    assert_eq!(first.tracking_code, "AFF-00000001");
    assert_eq!(second.tracking_code, "AFF-00000001");

    let cached = store
        .get(&ext("12345"), &CampaignTag::parse("default").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.url, first.url);
}

#[sqlx::test(migrations = "../../migrations")]
async fn expired_link_is_replaced(pool: sqlx::PgPool) {
    let store = PgAffiliateLinkStore::new(pool);
    let long_ago = Utc::now() - Duration::hours(2);

    store.insert_or_get(link(1, long_ago), None).await.unwrap();
    let replaced = store
        .insert_or_get(link(2, Utc::now()), Some(Utc::now() - Duration::hours(1)))
        .await
        .unwrap();
    assert_eq!(replaced.tracking_code, "AFF-00000002");
}
