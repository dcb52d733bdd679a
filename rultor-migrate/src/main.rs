//! rultor-migrate - stand document migration tool
//!
//! Imports a stand collection exported as JSON Lines into a local SQLite
//! document database, migrates it in place, audits the result and exports
//! it back.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rultor_common::config::{load_config_or_default, resolve_database_path, CompiledDefaults};
use rultor_common::db::{DocumentStore, SqliteStore};
use rultor_migrate::pipeline::{latest_version, pending_migrations};
use rultor_migrate::transfer::{export_jsonl, import_jsonl};
use rultor_migrate::{audit, run_migrations, standard_migrations, MergePair, RunOptions};
use serde::Serialize;
use tokio::io::{BufReader, BufWriter};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for rultor-migrate
#[derive(Parser, Debug)]
#[command(name = "rultor-migrate")]
#[command(about = "Migrate legacy stand documents to the current shape")]
#[command(version)]
struct Args {
    /// SQLite document database (overrides RULTOR_DATABASE and the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// TOML config file (default: <config dir>/rultor/migrate.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load documents from a JSON Lines file
    Import {
        file: PathBuf,
    },
    /// Write all documents as JSON Lines (stdout when no file is given)
    Export {
        file: Option<PathBuf>,
    },
    /// Run pending migration stages
    Migrate {
        /// Count changes without writing them
        #[arg(long)]
        dry_run: bool,
        /// Run every stage again, ignoring the recorded ones
        #[arg(long)]
        rerun: bool,
        /// Only migrate documents of this stand
        #[arg(long)]
        stand: Option<String>,
    },
    /// Report documents that are not fully migrated
    Audit {
        /// Only audit documents of this stand
        #[arg(long)]
        stand: Option<String>,
    },
    /// Show document count and migration version
    Status,
}

#[derive(Debug, Serialize)]
struct Status {
    database: PathBuf,
    documents: usize,
    schema_version: i32,
    latest_version: i32,
    pending: Vec<String>,
}

fn make_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr so JSON reports and exports own stdout. The filter is
    // reloadable because the config file may name a different level.
    let initial_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().log_level);
    let (filter, reload_handle) = reload::Layer::new(make_filter(&initial_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting rultor-migrate v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    if args.log_level.is_none() && std::env::var("RUST_LOG").is_err() {
        reload_handle
            .reload(make_filter(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());

    let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let pairs: Vec<MergePair> = config
        .effective_merge_pairs()
        .iter()
        .map(MergePair::from)
        .collect();
    let migrations = standard_migrations(&pairs);

    match args.command {
        Command::Import { file } => {
            let input = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let report = import_jsonl(&store, BufReader::new(input))
                .await
                .context("Import failed")?;
            if args.json {
                print_json(&report)?;
            } else {
                println!("imported {}, rejected {}", report.imported, report.rejected);
            }
        }

        Command::Export { file } => {
            let written = match file {
                Some(file) => {
                    let output = tokio::fs::File::create(&file)
                        .await
                        .with_context(|| format!("Failed to create {}", file.display()))?;
                    export_jsonl(&store, BufWriter::new(output)).await
                }
                None => export_jsonl(&store, tokio::io::stdout()).await,
            }
            .context("Export failed")?;
            info!("Wrote {} document(s)", written);
        }

        Command::Migrate {
            dry_run,
            rerun,
            stand,
        } => {
            let options = RunOptions {
                dry_run,
                rerun,
                stand,
            };
            let report = run_migrations(&store, &migrations, &options)
                .await
                .context("Migration failed")?;

            if args.json {
                print_json(&report)?;
            } else {
                for stage in &report.stages {
                    println!(
                        "{:<36} scanned {:>6}  updated {:>6}  unchanged {:>6}  skipped {:>6}  failed {:>6}",
                        stage.stage,
                        stage.scanned,
                        stage.updated,
                        stage.unchanged,
                        stage.skipped,
                        stage.failed
                    );
                }
                println!("version v{} -> v{}", report.from_version, report.to_version);
            }

            if report.failed() > 0 {
                warn!("{} document write(s) failed", report.failed());
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Audit { stand } => {
            let report = audit(&store, &pairs, stand.as_deref())
                .await
                .context("Audit failed")?;

            if args.json {
                print_json(&report)?;
            } else {
                for violation in &report.violations {
                    println!("{}", violation);
                }
                println!(
                    "{} document(s) scanned, {} violation(s)",
                    report.scanned,
                    report.violations.len()
                );
            }

            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Status => {
            let applied = store.applied_stages().await?;
            let status = Status {
                database: db_path.clone(),
                documents: store.count().await?,
                schema_version: store.schema_version().await?,
                latest_version: latest_version(&migrations),
                pending: pending_migrations(&migrations, &applied)
                    .iter()
                    .map(|m| format!("v{} {}", m.version, m.name()))
                    .collect(),
            };

            if args.json {
                print_json(&status)?;
            } else {
                println!("database:  {}", status.database.display());
                println!("documents: {}", status.documents);
                println!("version:   v{} (latest v{})", status.schema_version, status.latest_version);
                for pending in &status.pending {
                    println!("pending:   {}", pending);
                }
            }
        }
    }

    store.pool().close().await;
    Ok(ExitCode::SUCCESS)
}
