//! monday-drive-migrate CLI - Monday.com board to Google Drive/Sheets migration.

use clap::{Parser, Subcommand};
use monday_drive_migrate::{Config, MigrateError, Orchestrator, TargetMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "monday-drive-migrate")]
#[command(about = "Resumable Monday.com board to Google Drive/Sheets migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to progress state file (overrides config)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration, resuming from the saved progress cursor
    Run {
        /// Override worker pool width
        #[arg(long)]
        workers: Option<usize>,

        /// Override which asset classes are migrated: files, docs or all
        #[arg(long)]
        mode: Option<String>,
    },

    /// Validate the configuration file and exit
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Some(path) = cli.state_file {
        config.migration.state_file = Some(path);
    }

    match cli.command {
        Commands::Run { workers, mode } => {
            if let Some(w) = workers {
                if w == 0 {
                    return Err(MigrateError::Config("--workers must be at least 1".into()));
                }
                config.migration.workers = Some(w);
            }
            if let Some(mode) = mode {
                config.migration.mode = parse_mode(&mode)?;
            }

            let cancel_token = setup_signal_handler();
            let mut orchestrator = Orchestrator::from_config(&config)?;
            let result = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status = if result.cancelled {
                    "Migration interrupted, progress saved"
                } else {
                    "Migration completed!"
                };
                println!("\n{}", status);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Items seen: {}", result.items_seen);
                println!("  Migrated: {}", result.items_migrated);
                println!("  Skipped: {}", result.items_skipped);
                println!("  Failed: {}", result.items_failed);
                println!("  Files transferred: {}", result.assets_transferred);
                println!("  Bytes uploaded: {}", result.bytes_uploaded);
                println!("  Progress cursor: {}", result.final_offset);
                if !result.failed_items.is_empty() {
                    println!("  Failed items: {:?}", result.failed_items);
                }
            }

            if result.items_failed > 0 {
                return Err(MigrateError::Transfer {
                    asset: format!("{} items", result.items_failed),
                    message: "incomplete, re-run to converge".into(),
                });
            }
        }

        Commands::Validate => {
            // Config::load already validated; reaching here means it passed.
            println!("Configuration is valid");
        }
    }

    Ok(())
}

fn parse_mode(raw: &str) -> Result<TargetMode, MigrateError> {
    match raw.to_lowercase().as_str() {
        "files" => Ok(TargetMode::Files),
        "docs" => Ok(TargetMode::Docs),
        "all" => Ok(TargetMode::All),
        other => Err(MigrateError::Config(format!(
            "unknown mode '{}', expected files, docs or all",
            other
        ))),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Signal handlers for graceful shutdown: SIGINT (Ctrl-C) and SIGTERM.
/// The returned token is cancelled when either signal arrives; the
/// orchestrator stops after the item in flight and leaves the cursor
/// consistent.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
            sigint.recv().await;
            eprintln!("\nReceived SIGINT. Shutting down gracefully...");
            token_int.cancel();
        }
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
            eprintln!("\nReceived SIGTERM. Shutting down gracefully...");
            token_term.cancel();
        }
    });

    cancel_token
}

/// Windows fallback: Ctrl-C only.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    cancel_token
}
