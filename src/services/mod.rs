mod embedding;
pub mod vector_store;

pub use embedding::{EmbedOutcome, Embedder, HealthResponse, HttpEmbedder};
pub use vector_store::{CollectionInfo, QdrantBackend, VectorStore};
