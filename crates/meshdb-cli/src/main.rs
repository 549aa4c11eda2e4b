//! meshdb - mesh network database tool

use anyhow::Context;
use clap::Parser;
use tracing::info;

use meshdb_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, store::NetworkStore};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_configuration(&cli).context("Failed to load configuration")?;
    let store = NetworkStore::new(config.network_file(cli.file.as_deref()), config.cli.pretty);

    let output = CommandDispatcher::execute(cli.command, &store, &config)?;
    println!("{}", output.trim_end());
    Ok(())
}

/// Setup logging based on verbosity level
///
/// Logs go to stderr so that exported JSON on stdout stays clean.
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> meshdb_cli::Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        AppConfig::load_from_file(config_path)
    } else {
        Ok(AppConfig::default())
    }
}
