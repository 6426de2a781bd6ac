//! chainsql - command-line entry point.
//!
//! Runs the given statements and prints the results as JSON on stdout. Logs go to stderr.

use chainsql::config::{Cli, ConfigProvider, DbConfig, EnvConfig};
use chainsql::{DbError, QueryGateway, QueryOutput};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: &Cli) -> Result<QueryOutput, DbError> {
    // The environment may be incomplete when the flags supply the rest
    let base = match EnvConfig::new().load() {
        Ok(config) => config,
        Err(e) => {
            debug!(error = %e, "No usable configuration in the environment");
            DbConfig::default()
        }
    };
    let config = cli.connection_config(base)?;
    let gateway = QueryGateway::new(config);

    let output = if cli.is_batch() {
        gateway
            .transaction(cli.statements.iter().map(String::as_str))
            .await
            .map(QueryOutput::Batch)
    } else {
        gateway
            .query(cli.statements[0].as_str())
            .await
            .map(QueryOutput::Single)
    };

    gateway.close().await;
    output
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    info!(
        statements = cli.statements.len(),
        "Starting chainsql v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(&cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize results: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Execution failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            std::process::exit(1);
        }
    }
}
