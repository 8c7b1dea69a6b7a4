//! Resumable ingestion: batching, the state machine and the run driver.

mod batcher;
mod orchestrator;
mod state;

pub use batcher::Batcher;
pub use orchestrator::{BatchReport, Orchestrator, PipelineOptions, RunSummary};
pub use state::PipelineState;
