//! gattlane CLI entry point

use clap::Parser;
use tracing::{error, info};

use gattlane_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration before logging so the file can set the level
    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(cli.verbose, false);
            fail(e);
        }
    };
    setup_logging(cli.verbose || config.logging.verbose, config.logging.show_target);
    info!(lane = %config.lane.lane_name, "configuration loaded");

    if let Err(e) = CommandDispatcher::execute(cli.command, config).await {
        fail(e);
    }
}

/// Print a structured failure and exit
fn fail(e: gattlane_cli::CliError) -> ! {
    error!("Command execution failed: {}", e);
    match serde_json::to_string(&e.to_failure()) {
        Ok(failure) => println!("{}", failure),
        Err(_) => println!("{}", e),
    }
    std::process::exit(1);
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool, show_target: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(show_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(config_path) => AppConfig::load_from_file(config_path),
        None => Ok(AppConfig::default()),
    }
}
