use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vstat_core::PipelineConfig;
use vstat_storage::FsPartitionStore;
use vstat_sync::{PostgresWarehouse, RunOutcome, StatsPipeline};
use vstat_youtube::YoutubeClient;

#[derive(Debug, Parser)]
#[command(name = "vstat-cli")]
#[command(about = "Daily video statistics collection and reconciliation")]
struct Cli {
    /// Collection date to run for (YYYY-MM-DD); defaults to yesterday in VSTAT_TIME_ZONE.
    #[arg(long, global = true)]
    date: Option<NaiveDate>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search for new videos and write the day's cohort partition.
    Discover,
    /// Re-measure cohorts inside the retention window.
    Refresh,
    /// Build the warehouse tables for the date.
    Normalize {
        /// Also load the tables into DATABASE_URL.
        #[arg(long)]
        load: bool,
    },
}

fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Written { key, rows } => format!("wrote {rows} rows to {key}"),
        RunOutcome::NoData => "no data".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = PipelineConfig::from_env().context("loading configuration")?;

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let anchor = cli.date.unwrap_or_else(|| config.anchor_date(Utc::now()));
    let store = FsPartitionStore::from_bucket_uri(&config.bucket_uri).context("opening partition store")?;
    info!(bucket = %store.root().display(), %anchor, "starting run");
    let pipeline = StatsPipeline::new(config.clone(), Arc::new(store));

    match cli.command.unwrap_or(Commands::Refresh) {
        Commands::Discover => {
            let client = YoutubeClient::from_api_config(config.require_api_key()?, &config.api)?;
            let summary = pipeline.run_discovery(&client, anchor).await?;
            println!(
                "discover complete: run_id={} date={} hits={} {}",
                summary.run_id,
                summary.anchor,
                summary.search_hits,
                describe(&summary.outcome)
            );
        }
        Commands::Refresh => {
            let client = YoutubeClient::from_api_config(config.require_api_key()?, &config.api)?;
            let summary = pipeline.run_refresh(&client, anchor).await?;
            println!(
                "refresh complete: run_id={} date={} partitions={} skipped={} {}",
                summary.run_id,
                summary.anchor,
                summary.partitions_located,
                summary.partitions_skipped,
                describe(&summary.outcome)
            );
        }
        Commands::Normalize { load } => {
            let warehouse = if load {
                let url = config
                    .database_url
                    .as_deref()
                    .context("--load requires DATABASE_URL")?;
                Some(
                    PostgresWarehouse::connect(url)
                        .await
                        .context("connecting to warehouse")?,
                )
            } else {
                None
            };
            let summary = pipeline
                .run_normalize(anchor, Utc::now(), warehouse.as_ref())
                .await?;
            println!(
                "normalize complete: run_id={} date={} videos={} video_stats={} replaced={} loaded={} {}",
                summary.run_id,
                summary.anchor,
                summary.videos,
                summary.video_stats,
                summary.duplicates_replaced,
                summary.loaded.is_some(),
                describe(&summary.outcome)
            );
        }
    }

    Ok(())
}
