mod checkpoint;
mod config;
mod ingest;
mod search;
mod status;

pub use checkpoint::CheckpointCommand;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use search::SearchArgs;

pub use checkpoint::handle_checkpoint;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use search::handle_search;
pub use status::handle_status;
