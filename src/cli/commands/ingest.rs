//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::{CheckpointStore, FileCheckpoint};
use crate::cli::output::get_formatter;
use crate::dataset::{self, DatasetCursor};
use crate::error::PipelineFailure;
use crate::models::{Config, OutputFormat};
use crate::pipeline::{Orchestrator, PipelineOptions};
use crate::services::{Embedder, HttpEmbedder, QdrantBackend, VectorStore};

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(long, short = 'd', help = "Dataset file (JSON array or JSON lines)")]
    pub dataset: Option<PathBuf>,

    #[arg(long, short = 'b', help = "Records per batch")]
    pub batch_size: Option<usize>,

    #[arg(long, help = "Checkpoint file path")]
    pub checkpoint: Option<PathBuf>,

    #[arg(long, help = "Abort the run after this many seconds (0 = no limit)")]
    pub timeout_secs: Option<u64>,

    #[arg(long, help = "Hide the progress display")]
    pub no_progress: bool,
}

impl IngestArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ref path) = self.dataset {
            config.dataset.path = path.clone();
        }
        if let Some(size) = self.batch_size {
            config.pipeline.batch_size = size;
        }
        if let Some(ref path) = self.checkpoint {
            config.pipeline.checkpoint_path = path.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.pipeline.job_timeout_secs = secs;
        }
    }
}

/// Runs the pipeline to `DONE` or `FAILED`. A failed run prints its report on
/// stderr and yields a failure exit code.
pub async fn handle_ingest<F>(
    args: IngestArgs,
    mut config: Config,
    format: OutputFormat,
    verbose: bool,
    shutdown: F,
) -> Result<ExitCode>
where
    F: Future<Output = ()>,
{
    args.apply(&mut config);
    config.validate()?;
    let formatter = get_formatter(format);

    let options = PipelineOptions::from_config(&config.pipeline, config.embedding.dimension)?;
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let store: Arc<dyn VectorStore> = Arc::new(QdrantBackend::new(&config.vector_store)?);
    let checkpoint = FileCheckpoint::new(&config.pipeline.checkpoint_path);

    let (source, resume_at) = match open_inputs(&config, &checkpoint) {
        Ok(inputs) => inputs,
        Err(failure) => {
            eprint!("{}", formatter.format_ingest_failure(&failure));
            return Ok(ExitCode::FAILURE);
        }
    };

    eprintln!("Resuming at batch {resume_at}");
    if verbose {
        eprintln!("  Dataset:    {}", config.dataset.path.display());
        eprintln!("  Checkpoint: {}", checkpoint.path().display());
        eprintln!("  Batch size: {}", options.batch_size);
        eprintln!("  Embedding:  {}", config.embedding.url);
        eprintln!(
            "  Qdrant:     {} ({})",
            config.vector_store.url, config.vector_store.collection
        );
    }

    let pb = if args.no_progress || format == OutputFormat::Json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {pos} batches committed ({msg})",
            )
            .context("invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };
    let bar = pb.clone();
    let mut records = 0u64;

    let mut orchestrator = Orchestrator::new(embedder, store, checkpoint, options).on_commit(
        move |report| {
            records += report.upserted as u64;
            bar.inc(1);
            bar.set_message(format!("last batch {}, {} records", report.index, records));
        },
    );

    match orchestrator.run_until(source, shutdown).await {
        Ok(summary) => {
            pb.finish_and_clear();
            print!("{}", formatter.format_ingest_summary(&summary));
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            pb.abandon();
            eprint!("{}", formatter.format_ingest_failure(&failure));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Read the checkpoint and open the dataset, reporting failures the same way a
/// failed run does.
fn open_inputs(
    config: &Config,
    checkpoint: &FileCheckpoint,
) -> Result<(DatasetCursor, u64), PipelineFailure> {
    let last_committed = checkpoint.load().map_err(|e| PipelineFailure {
        error: e.into(),
        failing_batch: None,
        last_committed: None,
    })?;
    let resume_at = last_committed.map_or(0, |i| i + 1);

    let source =
        dataset::open(&config.dataset.path, config.dataset.format).map_err(|e| PipelineFailure {
            error: e.into(),
            failing_batch: Some(resume_at),
            last_committed,
        })?;
    Ok((source, resume_at))
}
