//! Embedding adapter: turns products and search queries into vectors.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, Record};

/// Result of embedding a single record inside a batch.
pub type EmbedOutcome = Result<Vec<f32>, EmbeddingError>;

/// Health response from the /health endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Maps records to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of records.
    ///
    /// The outer error fails the whole call and may be transient. On success the
    /// returned vector has exactly one entry per input record, in input order;
    /// an inner error means only that record could not be embedded.
    async fn embed(&self, records: &[Record]) -> Result<Vec<EmbedOutcome>, EmbeddingError>;

    /// Embed free text for similarity search.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn health_check(&self) -> Result<HealthResponse, EmbeddingError>;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbedInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: Vec<EmbedInput<'a>>,
}

/// One entry of the /embed response: a vector or a per-input error.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedItem {
    Vector(Vec<f32>),
    Failed { error: String },
}

/// Client for an HTTP embedding server.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_embed(&self, inputs: Vec<EmbedInput<'_>>) -> Result<Vec<EmbedItem>, EmbeddingError> {
        let expected = inputs.len();
        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { inputs })
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let items: Vec<EmbedItem> = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if items.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                items.len()
            )));
        }
        Ok(items)
    }

    fn check_vector(&self, vector: Vec<f32>) -> EmbedOutcome {
        if vector.len() == self.dimension {
            Ok(vector)
        } else {
            Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}

fn classify_send_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout
    } else if e.is_connect() {
        EmbeddingError::Connection(e.to_string())
    } else {
        EmbeddingError::Request(e)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, records: &[Record]) -> Result<Vec<EmbedOutcome>, EmbeddingError> {
        let mut outcomes: Vec<Option<EmbedOutcome>> = Vec::with_capacity(records.len());
        let mut inputs = Vec::new();
        let mut slots = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let image = record.primary_image();
            let text = record.embedding_text();
            if image.is_none() && text.is_none() {
                outcomes.push(Some(Err(EmbeddingError::NoInput)));
                continue;
            }
            outcomes.push(None);
            inputs.push(EmbedInput { image, text });
            slots.push(i);
        }

        if !inputs.is_empty() {
            debug!(inputs = inputs.len(), "requesting embeddings");
            let items = self.post_embed(inputs).await?;
            for (slot, item) in slots.into_iter().zip(items) {
                outcomes[slot] = Some(match item {
                    EmbedItem::Vector(v) => self.check_vector(v),
                    EmbedItem::Failed { error } => Err(EmbeddingError::Rejected(error)),
                });
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or(Err(EmbeddingError::NoInput)))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::NoInput);
        }
        let items = self
            .post_embed(vec![EmbedInput {
                image: None,
                text: Some(text.to_string()),
            }])
            .await?;

        match items.into_iter().next() {
            Some(EmbedItem::Vector(v)) => self.check_vector(v),
            Some(EmbedItem::Failed { error }) => Err(EmbeddingError::Rejected(error)),
            None => Err(EmbeddingError::InvalidResponse(
                "empty embedding response".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> Result<HealthResponse, EmbeddingError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Server {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        // Some servers answer with an empty or plain-text body.
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(HealthResponse {
            status: Some("healthy".to_string()),
            model_id: None,
        }))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
