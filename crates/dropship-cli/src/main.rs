mod affiliate;
mod jobs;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::affiliate::AffiliateCommands;
use crate::jobs::JobsCommands;

#[derive(Debug, Parser)]
#[command(name = "dropship-cli")]
#[command(about = "Dropship import pipeline command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Submit and inspect import jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Generate affiliate deep links
    Affiliate {
        #[command(subcommand)]
        command: AffiliateCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check that the database is reachable
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("dropship-cli: use --help to list commands");
        return Ok(());
    };

    let config = dropship_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool = dropship_db::connect_pool_from_config(&config).await?;

    match command {
        Commands::Db { command } => run_db(&pool, command).await,
        Commands::Jobs { command } => jobs::run(pool, command).await,
        Commands::Affiliate { command } => affiliate::run(pool, &config, command).await,
    }
}

async fn run_db(pool: &sqlx::PgPool, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let applied = dropship_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Ping => {
            dropship_db::health_check(pool).await?;
            println!("database ok");
        }
    }
    Ok(())
}
