//! examdesk - command-line host for the exam data store.
//!
//! `serve` keeps a store open with periodic autosave and timed backups until
//! Ctrl-C, then takes a teardown backup. The other subcommands are one-shot
//! maintenance operations against the same data directory.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use exam_store::{
    export_data, import_data, migrate_legacy_data, spawn_autosave, BackupError, BackupInterval,
    BackupManager, BackupOutcome, BackupSettings, FileMedium, LegacyScanner, PersistenceAdapter,
    PersistenceError, StorageKeys, Store, SystemClock,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "examdesk", about = "Exam authoring data store with backups and legacy migration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the store open with autosave and scheduled backups until Ctrl-C.
    Serve,
    /// Write tests and attempts as an export document.
    Export {
        /// Output file. Prints to stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Replace tests and attempts from an export document.
    Import {
        file: PathBuf,
    },
    /// Manage backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Scan for data left by older storage formats and merge it (once).
    Migrate,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Take a backup now.
    Create,
    /// List backups, newest first.
    List,
    /// Replace the current data with a backup.
    Restore { key: String },
    /// Delete one backup.
    Delete { key: String },
    /// Write every backup into one bundle document.
    Export {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show or change backup settings.
    Settings {
        #[arg(long)]
        enabled: Option<bool>,
        /// One of 10min, 1hour, 1day.
        #[arg(long)]
        interval: Option<BackupInterval>,
        #[arg(long)]
        max_backups: Option<usize>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("storage error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("import rejected: {0}")]
    ImportRejected(String),
}

/// Initialise tracing. With a log directory, events also go to a daily
/// rolling file; the returned guard must live until exit.
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "examdesk");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(fmt::layer().with_writer(std::io::stderr).with_span_events(FmtSpan::CLOSE))
        .with(filter())
        .init();
    Some(guard)
}

fn open_store() -> Result<Arc<Store>, CliError> {
    let data_dir = config::get_data_dir();
    let namespace = config::get_key_prefix();
    tracing::info!(data_dir = %data_dir.display(), namespace = %namespace, "Opening store");

    let medium = FileMedium::new(data_dir);
    medium.ensure_dir()?;
    let adapter = PersistenceAdapter::new(
        Arc::new(medium),
        StorageKeys::with_namespace(&namespace),
        Arc::new(SystemClock),
    );
    Ok(Arc::new(Store::open(adapter)))
}

/// Pretty-print a JSON document to a file or stdout.
fn write_json(document: serde_json::Value, out: Option<PathBuf>) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(&document)?;
    match out {
        Some(path) => {
            std::fs::write(&path, text)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

async fn serve(store: Arc<Store>) -> Result<(), CliError> {
    let report = migrate_legacy_data(&store, &LegacyScanner::default())?;
    if !report.skipped {
        tracing::info!(selected = ?report.selected_key, added = report.added.total(), "Legacy scan finished");
    }

    let autosave = spawn_autosave(store.clone(), Duration::from_secs(config::get_autosave_secs()))
        .map_err(|_| BackupError::NoRuntime)?;
    let backups = Arc::new(BackupManager::new(store.clone()));
    backups.start()?;

    tracing::info!("Serving, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    autosave.stop().await;
    match backups.shutdown() {
        Ok(Some(BackupOutcome::Created(key))) => tracing::info!(key = %key, "Teardown backup written"),
        Ok(Some(BackupOutcome::SkippedLocked)) => tracing::warn!("Teardown backup skipped, lock held"),
        Ok(None) => {}
        Err(e) => tracing::error!("Teardown backup failed: {}", e),
    }
    store.persist()?;
    Ok(())
}

fn run_backup_action(store: Arc<Store>, action: BackupAction) -> Result<(), CliError> {
    let backups = Arc::new(BackupManager::new(store));

    match action {
        BackupAction::Create => match backups.create_backup()? {
            BackupOutcome::Created(key) => println!("Created {}", key),
            BackupOutcome::SkippedLocked => println!("Skipped: another backup is in progress."),
        },
        BackupAction::List => {
            let listed = backups.list_backups()?;
            if listed.is_empty() {
                println!("No backups.");
            }
            for info in listed {
                println!(
                    "{}  tests={} attempts={} bank={} profiles={}",
                    info.key,
                    info.counts.tests,
                    info.counts.attempts,
                    info.counts.question_bank,
                    info.counts.scoring_profiles
                );
            }
        }
        BackupAction::Restore { key } => {
            backups.restore_from_backup(&key)?;
            println!("Restored {}", key);
        }
        BackupAction::Delete { key } => {
            if backups.delete_backup(&key)? {
                println!("Deleted {}", key);
            } else {
                println!("No backup named {}", key);
            }
        }
        BackupAction::Export { out } => {
            write_json(serde_json::to_value(backups.export_backups_bundle()?)?, out)?;
        }
        BackupAction::Settings {
            enabled,
            interval,
            max_backups,
        } => {
            let current = backups.settings();
            if enabled.is_some() || interval.is_some() || max_backups.is_some() {
                backups.update_settings(BackupSettings {
                    enabled: enabled.unwrap_or(current.enabled),
                    interval: interval.unwrap_or(current.interval),
                    max_backups: max_backups.unwrap_or(current.max_backups),
                })?;
            }
            write_json(serde_json::to_value(backups.settings())?, None)?;
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let store = open_store()?;

    match cli.command {
        Commands::Serve => serve(store).await?,
        Commands::Export { out } => write_json(serde_json::to_value(export_data(&store))?, out)?,
        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let outcome = import_data(&store, &json);
            if !outcome.success {
                return Err(CliError::ImportRejected(outcome.message));
            }
            println!("{}", outcome.message);
        }
        Commands::Backup { action } => run_backup_action(store, action)?,
        Commands::Migrate => {
            let report = migrate_legacy_data(&store, &LegacyScanner::default())?;
            write_json(serde_json::to_value(report)?, None)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing(config::get_log_dir());
    let cli = Cli::parse();
    run(cli).await?;
    Ok(())
}
