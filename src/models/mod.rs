mod batch;
mod config;
mod product;
mod search;

pub use batch::Batch;
pub use config::{
    CONFIG_PATH_ENV, Config, DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_URL, DEFAULT_QDRANT_URL, DatasetConfig, DatasetFormat, EmbeddingConfig,
    LOCAL_CONFIG_FILE, PipelineConfig, SearchConfig, VectorStoreConfig,
};
pub use product::{PointKey, ProductPoint, Record, RecordId};
pub use search::{OutputFormat, SearchHit, SearchQuery, SearchResults};
