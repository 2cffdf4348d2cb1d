use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hotmatch_sync::{report_markdown, run_scheduler, HotMatchConfig, PgStore, Pipeline, RunSummary};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "hotmatch")]
#[command(about = "Hot Match scoring, matching and discovery pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply database migrations.
    Migrate,
    /// Recompute GOD scores for every startup.
    ScoreGod,
    /// Recompute investor scores and tiers.
    ScoreInvestors,
    /// Re-evaluate smell tests for every startup.
    SmellTests,
    EnrichInvestors {
        #[arg(long)]
        limit: Option<u64>,
        /// Re-enrich investors that were already enriched.
        #[arg(long)]
        refresh: bool,
    },
    EnrichStartups {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Rebuild matches for one startup, or all approved startups.
    Rebuild {
        #[arg(long)]
        startup: Option<Uuid>,
    },
    Enqueue {
        startup: Uuid,
    },
    /// Run the matching queue worker.
    Queue {
        /// Drain one batch and exit.
        #[arg(long)]
        once: bool,
    },
    QueueStats,
    /// Pull RSS sources and extract newly funded startups.
    Discover,
    ImportDiscovered,
    Audit,
    /// Print the latest run reports as markdown.
    Report {
        #[arg(long, default_value_t = 10)]
        runs: usize,
    },
    Serve,
    /// Run discovery and rescoring on their cron schedules.
    Schedule,
}

fn print_headline<S: RunSummary>(summary: &S) {
    println!("{}", summary.headline());
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = HotMatchConfig::from_env()?;

    let command = cli.command.unwrap_or(Commands::QueueStats);
    match command {
        Commands::Migrate => {
            let store = PgStore::connect(config.require_database_url()?).await?;
            store.migrate().await?;
            println!("migrations applied");
            return Ok(());
        }
        Commands::Report { runs } => {
            println!("{}", report_markdown(&config.reports_dir, runs)?);
            return Ok(());
        }
        _ => {}
    }

    let pipeline = Pipeline::connect(config).await.context("connecting pipeline")?;
    match command {
        Commands::Migrate | Commands::Report { .. } => {}
        Commands::ScoreGod => print_headline(&pipeline.score_god().await?),
        Commands::ScoreInvestors => print_headline(&pipeline.score_investors().await?),
        Commands::SmellTests => print_headline(&pipeline.smell_tests().await?),
        Commands::EnrichInvestors { limit, refresh } => {
            print_headline(&pipeline.enrich_investors_with(limit, refresh).await?)
        }
        Commands::EnrichStartups { limit } => print_headline(&pipeline.enrich_startups(limit).await?),
        Commands::Rebuild { startup } => print_headline(&pipeline.rebuild(startup).await?),
        Commands::Enqueue { startup } => {
            if pipeline.enqueue(startup).await? {
                println!("queued {startup}");
            } else {
                println!("{startup} already has a live job");
            }
        }
        Commands::Queue { once } => print_headline(&pipeline.run_queue(once).await?),
        Commands::QueueStats => {
            let stats = pipeline.queue_stats().await?;
            println!(
                "queue: pending={} processing={} completed={} failed={}",
                stats.pending, stats.processing, stats.completed, stats.failed
            );
        }
        Commands::Discover => print_headline(&pipeline.discover().await?),
        Commands::ImportDiscovered => print_headline(&pipeline.import_discovered().await?),
        Commands::Audit => print_headline(&pipeline.audit().await?),
        Commands::Serve => hotmatch_web::serve(&pipeline).await?,
        Commands::Schedule => run_scheduler(Arc::new(pipeline)).await?,
    }

    Ok(())
}
