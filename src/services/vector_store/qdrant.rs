//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct, Range,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use tracing::{debug, info};

use super::payload::{from_qdrant_payload, to_qdrant_payload};
use super::{CollectionInfo, VectorStore};
use crate::error::StoreError;
use crate::models::{PointKey, ProductPoint, SearchHit, SearchQuery, VectorStoreConfig};

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, StoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }

    fn build_search_filter(query: &SearchQuery) -> Option<Filter> {
        let mut must: Vec<Condition> = Vec::new();

        if query.price_from.is_some() || query.price_to.is_some() {
            must.push(Condition::range(
                "current_price",
                Range {
                    gte: query.price_from,
                    lte: query.price_to,
                    ..Default::default()
                },
            ));
        }

        if let Some(ref category) = query.category {
            must.push(Condition::matches("category_name", category.clone()));
        }

        if must.is_empty() {
            None
        } else {
            Some(Filter::must(must))
        }
    }
}

fn point_id(key: PointKey) -> PointId {
    match key {
        PointKey::Num(n) => n.into(),
        PointKey::Uuid(s) => s.into(),
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn is_missing_collection(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("not found") || lower.contains("doesn't exist")
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, StoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, StoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(Some(CollectionInfo {
                points_count: info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            })),
            Err(e) => {
                let msg = e.to_string();
                if is_missing_collection(&msg) {
                    Ok(None)
                } else {
                    Err(StoreError::Collection(msg))
                }
            }
        }
    }

    async fn create_collection(&self, dimension: u64) -> Result<(), StoreError> {
        if self.collection_info().await?.is_some() {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine));

        match self.client.create_collection(create_collection).await {
            Ok(_) => {
                info!(collection = %self.collection, dimension, "created collection");
                Ok(())
            }
            // Lost a creation race with another client.
            Err(e) if e.to_string().to_lowercase().contains("already exists") => Ok(()),
            Err(e) => Err(StoreError::Collection(e.to_string())),
        }
    }

    async fn upsert(&self, points: &[ProductPoint]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = points
            .iter()
            .map(|point| {
                PointStruct::new(
                    point_id(point.id.point_key()),
                    point.vector.clone(),
                    to_qdrant_payload(&point.payload),
                )
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| StoreError::from_upsert_message(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, vector, query.limit).with_payload(true);

        if let Some(f) = Self::build_search_filter(query) {
            search_builder = search_builder.filter(f);
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| StoreError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| SearchHit {
                id: point_id_string(point.id),
                score: point.score,
                payload: from_qdrant_payload(point.payload),
            })
            .collect())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
