pub mod checkpoint;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{PipelineError, PipelineFailure};
pub use models::{Config, OutputFormat};
pub use pipeline::{Orchestrator, PipelineOptions, PipelineState, RunSummary};
