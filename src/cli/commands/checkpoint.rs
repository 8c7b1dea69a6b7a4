use anyhow::{Context, Result};
use clap::Subcommand;

use super::status::checkpoint_info;
use crate::checkpoint::{CheckpointStore, FileCheckpoint};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    /// Show the last committed batch
    Show,

    /// Forget all progress so the next ingest starts from batch 0
    Reset {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub fn handle_checkpoint(
    cmd: CheckpointCommand,
    config: &Config,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        CheckpointCommand::Show => {
            print!("{}", formatter.format_checkpoint(&checkpoint_info(config)));
        }
        CheckpointCommand::Reset { yes } => {
            let mut checkpoint = FileCheckpoint::new(&config.pipeline.checkpoint_path);

            if !yes {
                println!(
                    "This will reset the checkpoint at '{}'; the next ingest re-processes every batch. Continue? [y/N]",
                    checkpoint.path().display()
                );
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if !input.trim().eq_ignore_ascii_case("y") {
                    print!("{}", formatter.format_message("Cancelled."));
                    return Ok(());
                }
            }

            checkpoint.reset().context("failed to reset checkpoint")?;
            print!(
                "{}",
                formatter.format_message(&format!(
                    "Checkpoint reset: {}",
                    checkpoint.path().display()
                ))
            );
        }
    }

    Ok(())
}
