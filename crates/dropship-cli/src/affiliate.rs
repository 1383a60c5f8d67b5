use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use dropship_core::AppConfig;
use dropship_db::PgAffiliateLinkStore;
use dropship_pipeline::{AffiliateConfig, AffiliateLinkGenerator};
use sqlx::PgPool;

#[derive(Debug, Subcommand)]
pub enum AffiliateCommands {
    /// Print the tracked link for a product, creating it if needed
    Link {
        ali_id: String,
        /// Campaign tag; defaults to the configured campaign
        #[arg(long)]
        campaign: Option<String>,
    },
}

pub(crate) async fn run(
    pool: PgPool,
    config: &AppConfig,
    command: AffiliateCommands,
) -> anyhow::Result<()> {
    let generator = AffiliateLinkGenerator::new(
        AffiliateConfig::from_app_config(config).context("invalid affiliate configuration")?,
        Arc::new(PgAffiliateLinkStore::new(pool)),
    );

    match command {
        AffiliateCommands::Link { ali_id, campaign } => {
            let link = generator.generate(&ali_id, campaign.as_deref()).await?;
            if !link.affiliate {
                tracing::warn!("affiliate links are disabled; printing the plain item page");
            }
            println!("{}", link.url);
            println!("tracking code: {}", link.tracking_code);
        }
    }
    Ok(())
}
