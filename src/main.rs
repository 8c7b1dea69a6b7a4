use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use prodsearch::cli::commands::{
    handle_checkpoint, handle_config, handle_ingest, handle_search, handle_status,
};
use prodsearch::cli::{Cli, Commands};
use prodsearch::models::{Config, OutputFormat};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("prodsearch={default_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;
    let config_path = cli.config;

    if let Commands::Config(cmd) = cli.command {
        handle_config(cmd, config_path.as_deref(), format, verbose)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(config_path.as_deref())?;

    // Ingest handles the signal itself so the run can report where it stopped.
    if let Commands::Ingest(args) = cli.command {
        return handle_ingest(args, config, format, verbose, shutdown_signal()).await;
    }

    tokio::select! {
        result = run_command(cli.command, &config, format, verbose) => {
            result?;
            Ok(ExitCode::SUCCESS)
        }
        _ = shutdown_signal() => {
            eprintln!("\nInterrupted");
            Ok(ExitCode::from(130))
        }
    }
}

async fn run_command(
    command: Commands,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match command {
        Commands::Search(args) => handle_search(args, config, format, verbose).await,
        Commands::Status => handle_status(config, format, verbose).await,
        Commands::Checkpoint(cmd) => handle_checkpoint(cmd, config, format, verbose),
        Commands::Ingest(_) | Commands::Config(_) => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
