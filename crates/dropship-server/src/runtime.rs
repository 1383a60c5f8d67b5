//! Wires configuration into stores, the source adapter, the worker pool and
//! the HTTP state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dropship_core::{AffiliateLinkStore, AppConfig, CatalogStore, JobStore, ListingSource};
use dropship_db::{PgAffiliateLinkStore, PgCatalogStore, PgJobStore};
use dropship_pipeline::{
    AffiliateConfig, AffiliateLinkGenerator, ImportIntake, InMemoryAffiliateLinkStore,
    InMemoryCatalogStore, InMemoryJobStore, Pipeline, RateLimiter, Transformer, WorkerConfig,
    WorkerPool,
};
use dropship_source::{AliExpressClient, SimulatedSource};
use sqlx::PgPool;
use tokio::sync::Notify;

use crate::api::AppState;

struct Stores {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogStore>,
    links: Arc<dyn AffiliateLinkStore>,
    pool: Option<PgPool>,
}

async fn connect_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; using in-memory stores, jobs will not survive a restart");
        return Ok(Stores {
            jobs: Arc::new(InMemoryJobStore::new()),
            catalog: Arc::new(InMemoryCatalogStore::new()),
            links: Arc::new(InMemoryAffiliateLinkStore::new()),
            pool: None,
        });
    }

    let pool = dropship_db::connect_pool_from_config(config)
        .await
        .context("failed to connect to database")?;
    let applied = dropship_db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!(applied, "database ready");

    Ok(Stores {
        jobs: Arc::new(PgJobStore::new(pool.clone())),
        catalog: Arc::new(PgCatalogStore::new(pool.clone())),
        links: Arc::new(PgAffiliateLinkStore::new(pool.clone())),
        pool: Some(pool),
    })
}

fn build_source(config: &AppConfig) -> anyhow::Result<Arc<dyn ListingSource>> {
    if config.simulation {
        tracing::info!("simulation mode: listings are synthesized locally");
        return Ok(Arc::new(SimulatedSource::new()));
    }

    let client = AliExpressClient::new(
        &config.source_base_url,
        config.source_app_key.clone(),
        config.fetch_timeout_secs,
        &config.source_user_agent,
    )
    .context("failed to build marketplace client")?;
    tracing::info!(base_url = %config.source_base_url, "marketplace client ready");
    Ok(Arc::new(client))
}

/// Everything the server runs besides the listener.
pub struct Runtime {
    pub state: AppState,
    pub workers: WorkerPool,
}

/// Connects stores, recovers interrupted jobs and starts the worker pool.
///
/// # Errors
///
/// Fails if the database is unreachable, migrations fail, the marketplace
/// client cannot be built, or the affiliate configuration is invalid.
pub async fn start(config: &AppConfig) -> anyhow::Result<Runtime> {
    let stores = connect_stores(config).await?;
    let source = build_source(config)?;

    let recovered = stores
        .jobs
        .recover_in_flight()
        .await
        .context("failed to recover in-flight jobs")?;
    if recovered > 0 {
        tracing::info!(recovered, "re-queued interrupted imports");
    }

    let wake = Arc::new(Notify::new());
    let intake = ImportIntake::new(Arc::clone(&stores.jobs), Arc::clone(&wake));

    let pipeline = Arc::new(Pipeline {
        jobs: stores.jobs,
        source,
        catalog: stores.catalog,
        limiter: Arc::new(RateLimiter::new(
            config.rate_limit_max_calls,
            Duration::from_secs(config.rate_limit_window_secs),
        )),
        transformer: Transformer::new(config.markup_percent, config.marketplace_id.clone()),
        config: WorkerConfig::from_app_config(config),
    });
    let workers = WorkerPool::spawn(pipeline, wake);

    let affiliate = AffiliateLinkGenerator::new(
        AffiliateConfig::from_app_config(config).context("invalid affiliate configuration")?,
        stores.links,
    );

    Ok(Runtime {
        state: AppState {
            intake,
            affiliate,
            simulation: config.simulation,
            pool: stores.pool,
        },
        workers,
    })
}

#[cfg(test)]
mod tests {
    use dropship_core::{build_app_config, JobStatus};

    use super::*;

    fn memory_config() -> AppConfig {
        let mut config = build_app_config(|_| Err(std::env::VarError::NotPresent)).unwrap();
        config.poll_interval_ms = 10;
        config.worker_count = 2;
        config
    }

    #[tokio::test]
    async fn memory_runtime_imports_end_to_end() {
        let runtime = start(&memory_config()).await.unwrap();
        assert_eq!(runtime.workers.size(), 2);
        assert!(runtime.state.pool.is_none());

        let intake = runtime.state.intake.clone();
        let job = intake.submit("12345").await.unwrap().job;

        let done = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = intake.get(job.id).await.unwrap().unwrap();
                if current.status.is_terminal() {
                    return current;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("import should finish");

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.attempts, 1);
        assert!(done.catalog_item_id.is_some());

        runtime.workers.shutdown().await;
    }

    #[test]
    fn live_mode_builds_the_http_client() {
        let mut config = memory_config();
        config.simulation = false;
        config.source_base_url = "https://api.example.com".to_string();
        assert!(build_source(&config).is_ok());
    }
}
