//! `jobs` subcommands. Jobs submitted here are picked up by a running
//! server's workers; the CLI never processes them itself.

use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use dropship_core::{ImportJob, JobId};
use dropship_db::PgJobStore;
use dropship_pipeline::ImportIntake;
use sqlx::PgPool;
use tokio::sync::Notify;

#[derive(Debug, Subcommand)]
pub enum JobsCommands {
    /// Queue an import for a marketplace product id
    Submit {
        /// Marketplace product id (digits only)
        ali_id: String,
    },
    /// List recent jobs, newest first
    List {
        /// Maximum number of jobs to show
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show one job
    Show {
        job_id: String,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },
}

pub(crate) async fn run(pool: PgPool, command: JobsCommands) -> anyhow::Result<()> {
    let intake = ImportIntake::new(Arc::new(PgJobStore::new(pool)), Arc::new(Notify::new()));

    match command {
        JobsCommands::Submit { ali_id } => {
            let submission = intake.submit(&ali_id).await?;
            let verb = if submission.created { "queued" } else { "already active" };
            println!("{} {verb} ({})", submission.job.id, submission.job.status);
        }
        JobsCommands::List { limit } => {
            let jobs = intake.list(limit).await?;
            if jobs.is_empty() {
                println!("no jobs");
            }
            for job in &jobs {
                println!("{}", summary_line(job));
            }
        }
        JobsCommands::Show { job_id, json } => {
            let id: JobId = job_id
                .parse()
                .with_context(|| format!("invalid job id: {job_id}"))?;
            let job = intake
                .get(id)
                .await?
                .with_context(|| format!("job {job_id} not found"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                println!("{}", summary_line(&job));
                if let Some(error) = &job.last_error {
                    println!("  last error ({}): {}", error.kind, error.message);
                }
                if let Some(at) = job.next_attempt_at {
                    println!("  next attempt: {}", at.to_rfc3339());
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn summary_line(job: &ImportJob) -> String {
    let item = job
        .catalog_item_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    format!(
        "{}  {:<12} {:<12} attempts={} item={} updated={}",
        job.id,
        job.external_id.to_string(),
        job.status.as_str(),
        job.attempts,
        item,
        job.updated_at.format("%Y-%m-%d %H:%M:%S")
    )
}
