//! Paylis Gateway - Main Application Entry Point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{ConfigLoader, ConfigValidator, LoggingConfig};
use std::{env, path::PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod database;
mod storage;

use app::Application;

#[derive(Debug, Parser)]
#[command(name = "paylis", version, about = "Payment intent and relay settlement gateway")]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve,
    /// Write an example configuration file
    InitConfig {
        #[arg(default_value = "config.example.yaml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::InitConfig { path } => {
            ConfigLoader::create_example(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Example configuration written to {}", path.display());
            Ok(())
        }
        Command::Serve => serve(cli.config, dotenv_loaded).await,
    }
}

async fn serve(config_path: PathBuf, dotenv_loaded: bool) -> Result<()> {
    let config = ConfigLoader::load(&config_path).context("Failed to load configuration")?;

    init_logging(&config.logging)?;

    info!("Starting Paylis Gateway v{}", env!("CARGO_PKG_VERSION"));
    if dotenv_loaded {
        info!("Loaded environment variables from .env file");
    }
    info!(path = %config_path.display(), "Configuration loaded");
    info!(
        network = %config.network.name,
        chain_id = config.network.chain_id,
        relayer = %config.relayer.relayer_id,
        tokens = config.tokens.len(),
        "Settlement network"
    );

    let report = ConfigValidator::validate(&config)?;
    for issue in &report.warnings {
        warn!(field = %issue.field, "{}", issue.message);
    }
    if report.has_errors() {
        for issue in &report.errors {
            error!(field = %issue.field, "{}", issue.message);
        }
        bail!("Invalid configuration: {}", report.summary());
    }

    let app = Application::new(config)
        .await
        .context("Failed to create application")?;

    let result = app.run(shutdown_signal()).await;
    if let Err(e) = &result {
        error!("Application error: {:#}", e);
    }

    app.shutdown().await?;
    info!("Paylis Gateway shutdown complete");
    result
}

/// Resolves on Ctrl-C, or never when the handler cannot be installed
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining connections"),
        Err(e) => {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Initialize logging; RUST_LOG and LOG_FORMAT override the configuration
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone());
    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let mut env_filter = tracing_subscriber::EnvFilter::try_new(&log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if !logging.sql_logging {
        if let Ok(directive) = "sqlx=warn".parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format.as_str() {
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("Failed to initialize pretty logging")?,
        _ => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to initialize JSON logging")?,
    }

    info!(level = %log_level, format = %log_format, "Logging initialized");
    if log_level == "trace" || log_level == "debug" {
        warn!("Debug/trace logging enabled - may impact performance in production");
    }

    Ok(())
}
