//! Vector store abstraction layer.
//!
//! The pipeline and the search command only talk to [`VectorStore`]; Qdrant is
//! the one backend shipped.

mod payload;
mod qdrant;

pub use payload::{from_qdrant_payload, to_qdrant_payload};
pub use qdrant::QdrantBackend;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{ProductPoint, SearchHit, SearchQuery};

/// Collection information.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub points_count: u64,
}

/// Idempotent upsert/query service keyed by record id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is reachable.
    async fn health_check(&self) -> Result<bool, StoreError>;

    /// Returns `None` if the collection doesn't exist.
    async fn collection_info(&self) -> Result<Option<CollectionInfo>, StoreError>;

    /// Create the collection with cosine distance if it doesn't exist yet.
    async fn create_collection(&self, dimension: u64) -> Result<(), StoreError>;

    /// Insert or overwrite points. Upserting the same id twice leaves one point.
    ///
    /// Returns only once the points are durably stored.
    async fn upsert(&self, points: &[ProductPoint]) -> Result<(), StoreError>;

    /// Nearest neighbours of `vector`, filtered by the query's price range and category.
    async fn search(
        &self,
        vector: Vec<f32>,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError>;

    fn collection(&self) -> &str;
}
