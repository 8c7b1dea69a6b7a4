//! Search-related models for queries and results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Free-text product query with optional payload filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    /// Inclusive lower price bound.
    pub price_from: Option<f64>,
    /// Inclusive upper price bound.
    pub price_to: Option<f64>,
    pub category: Option<String>,
    pub limit: u64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            price_from: None,
            price_to: None,
            category: None,
            limit: 20,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_price_range(mut self, from: Option<f64>, to: Option<f64>) -> Self {
        self.price_from = from;
        self.price_to = to;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.trim().is_empty());
        self
    }

    /// Reject queries the store could never answer meaningfully.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("search query cannot be empty".to_string());
        }
        if self.limit == 0 {
            return Err("limit must be at least 1".to_string());
        }
        for bound in [self.price_from, self.price_to].into_iter().flatten() {
            if !bound.is_finite() || bound < 0.0 {
                return Err(format!("invalid price bound: {bound}"));
            }
        }
        if let (Some(from), Some(to)) = (self.price_from, self.price_to)
            && from > to
        {
            return Err(format!("price range is empty: from {from} > to {to}"));
        }
        Ok(())
    }
}

/// One matched product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

impl SearchHit {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn currency(&self) -> Option<&str> {
        self.str_field("currency")
    }

    pub fn link(&self) -> Option<&str> {
        self.str_field("link")
    }

    pub fn price(&self) -> Option<f64> {
        self.payload.get("current_price").and_then(Value::as_f64)
    }

    pub fn images(&self) -> Vec<&str> {
        self.payload
            .get("images")
            .and_then(Value::as_array)
            .map(|images| images.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Collection of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(query: String, hits: Vec<SearchHit>, duration_ms: u64) -> Self {
        Self {
            query,
            hits,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}
