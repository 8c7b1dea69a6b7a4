use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::error::SearchError;
use crate::models::{Config, OutputFormat, SearchQuery, SearchResults};
use crate::services::{Embedder, HttpEmbedder, QdrantBackend, VectorStore};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long = "from", help = "Minimum current price (inclusive)")]
    pub price_from: Option<f64>,

    #[arg(long = "to", help = "Maximum current price (inclusive)")]
    pub price_to: Option<f64>,

    #[arg(long, help = "Only return products in this category")]
    pub category: Option<String>,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<u64>,
}

impl SearchArgs {
    fn to_query(&self, default_limit: u64) -> SearchQuery {
        SearchQuery::new(self.query.trim())
            .with_limit(self.limit.unwrap_or(default_limit))
            .with_price_range(self.price_from, self.price_to)
            .with_category(self.category.clone())
    }
}

/// Embed the query text and fetch the nearest products.
pub async fn search_products(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &SearchQuery,
) -> Result<SearchResults, SearchError> {
    query.validate().map_err(SearchError::InvalidQuery)?;
    let start = Instant::now();

    let vector = embedder.embed_query(&query.text).await?;
    let hits = store.search(vector, query).await?;

    Ok(SearchResults::new(
        query.text.clone(),
        hits,
        start.elapsed().as_millis() as u64,
    ))
}

pub async fn handle_search(
    args: SearchArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let query = args.to_query(config.search.default_limit);

    if verbose {
        eprintln!("Query: \"{}\"", query.text);
        eprintln!("  Limit: {}", query.limit);
        if query.price_from.is_some() || query.price_to.is_some() {
            let bound = |b: Option<f64>| b.map_or_else(|| "*".to_string(), |v| v.to_string());
            eprintln!(
                "  Price: {} .. {}",
                bound(query.price_from),
                bound(query.price_to)
            );
        }
        if let Some(ref category) = query.category {
            eprintln!("  Category: {category}");
        }
    }

    let embedder = HttpEmbedder::new(&config.embedding)?;
    let store = QdrantBackend::new(&config.vector_store)?;

    let results = search_products(&embedder, &store, &query)
        .await
        .context("search failed")?;

    print!("{}", formatter.format_search_results(&results));
    Ok(())
}
