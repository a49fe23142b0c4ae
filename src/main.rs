//! Connection Hub
//!
//! Command-line front end of the connection registry: health checks the
//! configured connections and lists the supported drivers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connection_hub::{
    bootstrap,
    config::{Environment, Settings},
    ConnectionFactory, ConnectionManager, DatabaseConnection,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Connection Hub
///
/// Resolve, connect and health check logical database connections.
#[derive(Parser, Debug)]
#[command(name = "connection-hub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Environment: dev, staging, prod (overrides ENVIRONMENT env var)
    #[arg(short, long, global = true)]
    env: Option<Environment>,

    /// File with local connection configurations (overrides CONNECTIONS_FILE env var)
    #[arg(long, global = true)]
    connections_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to each named connection and report its health
    Check {
        /// Connection names (default: every locally configured connection)
        names: Vec<String>,
    },
    /// List the accepted driver aliases
    Drivers,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration first (before logging, so we can use log_level)
    let mut settings = Settings::load()?;

    // Override settings with CLI arguments
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }
    if let Some(path) = args.connections_file {
        settings.connections_file = Some(path);
    }

    // Initialize tracing subscriber with JSON output
    init_tracing(&settings.log_level);

    tracing::info!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        "Starting application"
    );

    match args.command {
        Command::Drivers => {
            for driver in ConnectionFactory::new().supported_drivers() {
                println!("{}", driver);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { names } => {
            let manager = bootstrap::build_manager(&settings)
                .await
                .context("Failed to build connection manager")?;

            let names = if names.is_empty() {
                manager.registered_names()
            } else {
                names
            };

            let all_healthy = check_connections(&manager, &names).await;
            manager.disconnect_all().await;

            if all_healthy {
                println!("All connections are healthy");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Some connections failed");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Print one line per connection; `true` when every one is healthy
async fn check_connections(manager: &ConnectionManager, names: &[String]) -> bool {
    if names.is_empty() {
        println!("No connections configured");
        return true;
    }

    let mut all_healthy = true;

    for name in names {
        match manager.get_connection(name).await {
            Ok(connection) => {
                let healthy = connection.is_healthy().await;
                println!(
                    "{:<32} {:<10} {}",
                    connection.name(),
                    connection.kind(),
                    if healthy { "healthy" } else { "unhealthy" }
                );
                all_healthy &= healthy;
            }
            Err(e) => {
                println!("{:<32} {:<10} error: {}", name, "-", e);
                all_healthy = false;
            }
        }
    }

    all_healthy
}

/// Initialize tracing subscriber with the specified log level
fn init_tracing(log_level: &str) {
    // Build filter from RUST_LOG env var or use provided log level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // JSON to stderr so stdout stays readable
    let console_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(console_layer).init();
}
