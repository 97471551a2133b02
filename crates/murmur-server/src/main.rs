//! murmurd - murmur node daemon.
//!
//! Runs the HTTP update API around the self-update orchestrator. The
//! daemon expects to run under a supervisor (container runtime or
//! process manager) with a restart-always policy: a finished update
//! exits with code 0 and relies on the supervisor to bring the new
//! code online.

use std::path::PathBuf;

use clap::Parser;
use murmur_server::{Server, ServerConfig, DEFAULT_PORT};
use murmur_updater::{UpdateConfig, Updater};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// murmur node daemon - update API surface
#[derive(Parser, Debug)]
#[command(name = "murmurd", version, about)]
struct Args {
    /// Host to bind the API server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the API server
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Root of the installed application tree
    #[arg(long, default_value = ".")]
    app_root: PathBuf,

    /// Override the remote manifest URL
    #[arg(long)]
    manifest_url: Option<String>,

    /// Override the remote release-notes URL
    #[arg(long)]
    notes_url: Option<String>,

    /// Override the release archive URL
    #[arg(long)]
    archive_url: Option<String>,

    /// Dependency-install command to run after an update
    #[arg(long, num_args = 1.., value_delimiter = ' ')]
    install_command: Option<Vec<String>>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Initialize logging with daily file rotation under the app root.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("murmur={},warn", log_level)));

    let log_dir = args.app_root.join("logs");
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .max_log_files(5)
            .filename_prefix("murmurd")
            .filename_suffix("log")
            .build(&log_dir)
            .ok();

        if let Some(appender) = file_appender {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            tracing::info!("Logging to {:?}", log_dir);
            return Some(guard);
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::warn!("File logging unavailable, using console only");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let mut update_config = UpdateConfig::default().with_app_root(args.app_root.clone());
    if let Some(url) = args.manifest_url.clone() {
        update_config = update_config.with_manifest_url(url);
    }
    if let Some(url) = args.notes_url.clone() {
        update_config = update_config.with_notes_url(url);
    }
    if let Some(url) = args.archive_url.clone() {
        update_config = update_config.with_archive_url(url);
    }
    if let Some(command) = args.install_command.clone() {
        update_config = update_config.with_install_command(command);
    }

    let updater = Updater::new(update_config)?;

    let server_config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
    };
    let server = Server::new(server_config, updater)?;

    server.run().await?;
    Ok(())
}
