use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rfs_adapters::JsonBatchSource;
use rfs_storage::FindingStore;
use rfs_sync::{load_scoring_rules, open_store, report, ScanConfig, ScanPipeline};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "rfs-cli")]
#[command(about = "Research feed scanner command-line interface")]
struct Cli {
    /// Findings database (file path or sqlite: url). Overrides RFS_DATABASE_PATH.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score a batch, store new findings, and print the digest.
    Scan {
        #[arg(long)]
        batch: Option<PathBuf>,
        #[arg(long)]
        rules: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        /// Skip writing reports/<run_id>/.
        #[arg(long)]
        no_reports: bool,
    },
    /// Create the findings table if it does not exist.
    Migrate,
    /// Print stored findings for the given search terms.
    Top {
        #[arg(long = "term", required = true)]
        terms: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Summarize the most recent scan runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rfs_sync=info,rfs_storage=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ScanConfig::from_env();
    if let Some(db) = cli.db {
        config.database = db;
    }

    let command = cli.command.unwrap_or(Commands::Scan {
        batch: None,
        rules: None,
        limit: None,
        no_reports: false,
    });

    match command {
        Commands::Scan {
            batch,
            rules,
            limit,
            no_reports,
        } => {
            if let Some(batch) = batch {
                config.batch_path = batch;
            }
            if let Some(rules) = rules {
                config.rules_path = rules;
            }
            if let Some(limit) = limit {
                config.report_limit = limit;
            }
            if no_reports {
                config.reports_dir = None;
            }

            let rules = load_scoring_rules(&config.rules_path)?;
            let source = JsonBatchSource::new(config.batch_path.clone());
            let summary = ScanPipeline::new(config, rules).run_once(&source).await?;
            println!("{}", report::render_digest(&summary));
            if let Some(dir) = &summary.reports_dir {
                eprintln!("reports written to {dir}");
            }
            if summary.ingest.has_failures() {
                warn!(
                    malformed = summary.ingest.malformed,
                    write_failures = summary.ingest.write_failures,
                    "scan finished with per-record failures"
                );
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Migrate => {
            let store = open_store(&config.database).await?;
            let result = store.ensure_schema().await;
            store.close().await;
            result?;
            println!("schema ready: {}", config.database);
        }
        Commands::Top { terms, limit } => {
            let store = open_store(&config.database).await?;
            let result = match store.ensure_schema().await {
                Ok(()) => {
                    store
                        .query_top_by_score(&terms, limit.unwrap_or(config.report_limit))
                        .await
                }
                Err(err) => Err(err),
            };
            store.close().await;
            let entries = result?;
            if entries.is_empty() {
                println!("no stored findings for {}", terms.join(", "));
            }
            print!("{}", report::render_findings(&entries));
        }
        Commands::Report { runs } => {
            let Some(reports_dir) = config.reports_dir else {
                anyhow::bail!("reports are disabled (RFS_REPORTS_DIR is empty)");
            };
            println!("{}", rfs_sync::report_recent_runs(runs, &reports_dir)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
