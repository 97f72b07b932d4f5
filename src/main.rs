/// sentinel: real-time standards validation for a source tree
///
/// Commands:
/// - watch: validate changes as they happen until Ctrl-C
/// - history: print the most recent persisted metrics records
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sentinel::config::{SentinelConfig, DATA_DIR};
use sentinel::metrics::JsonHistorySink;
use sentinel::rules::StandardsValidator;
use sentinel::ValidationService;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Incremental, real-time standards validation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and validate files as they change
    Watch {
        /// Project root to watch recursively
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Config file (defaults to <root>/.sentinel/sentinel.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print persisted metrics history as JSON
    History {
        /// Project root whose history to read
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Number of most recent records to print
        #[arg(short, long, default_value_t = 10)]
        last: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { root, config } => {
            let root = root
                .canonicalize()
                .with_context(|| format!("Project root {} not found", root.display()))?;
            let _log_guards = init_logging(&root)?;
            watch(root, config).await
        }
        Commands::History { root, last } => history(&root, last),
    }
}

/// Console output plus a daily log file under `<root>/.sentinel/logs`
fn init_logging(root: &Path) -> Result<(WorkerGuard, WorkerGuard)> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("sentinel=info"))?;

    let logs_dir = root.join(DATA_DIR).join("logs");
    fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

    let file_appender = rolling::daily(&logs_dir, "sentinel.log");
    let (non_blocking_file, file_guard) = non_blocking(file_appender);
    let (non_blocking_console, console_guard) = non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking_console)
                .with_target(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    Ok((file_guard, console_guard))
}

async fn watch(root: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = match &config_path {
        Some(path) => SentinelConfig::load_from(path),
        None => SentinelConfig::load(&root),
    }
    .context("Failed to load configuration")?;

    let validator = StandardsValidator::new().context("Failed to compile built-in rules")?;

    let mut service = ValidationService::builder(root.clone(), config, Arc::new(validator))
        .history_sink()
        .build()
        .context("Failed to build validation service")?;

    service
        .start()
        .await
        .with_context(|| format!("Failed to start watching {}", root.display()))?;
    info!("Watching {} (Ctrl-C to stop)", root.display());

    let watcher_failed = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C, shutting down: {}", e);
            }
            false
        }
        _ = service.shutdown_requested() => true,
    };

    info!("Shutting down");
    service.stop().await.context("Failed to stop cleanly")?;
    if watcher_failed {
        bail!("File watcher for {} failed repeatedly", root.display());
    }

    let effectiveness = service.current_effectiveness();
    info!(
        effectiveness_score = effectiveness.effectiveness_score,
        time_saved_hours = effectiveness.time_saved_hours,
        trend = ?service.effectiveness_trend(),
        "Session summary"
    );
    Ok(())
}

fn history(root: &Path, last: usize) -> Result<()> {
    let config = SentinelConfig::load(root).context("Failed to load configuration")?;
    let sink = JsonHistorySink::new(
        config.history_path(root),
        config.metrics.history_retention,
    );

    let history = sink
        .load()
        .with_context(|| format!("Failed to read history {}", sink.path().display()))?;

    let json = serde_json::to_string_pretty(history.last_n(last))?;
    println!("{}", json);
    Ok(())
}
