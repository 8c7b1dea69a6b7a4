use std::fmt::Write as FmtWrite;
use std::path::PathBuf;

use serde_json::json;

use crate::error::PipelineFailure;
use crate::models::{OutputFormat, SearchResults};
use crate::pipeline::RunSummary;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_ingest_summary(&self, summary: &RunSummary) -> String;
    fn format_ingest_failure(&self, failure: &PipelineFailure) -> String;
    fn format_checkpoint(&self, checkpoint: &CheckpointInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub dataset_path: PathBuf,
    pub checkpoint: CheckpointInfo,
    pub embedding_url: String,
    pub embedding_healthy: bool,
    pub embedding_model: Option<String>,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    /// `None` when the collection does not exist yet.
    pub vector_store_points: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub last_committed: Option<u64>,
    /// Set when the checkpoint file exists but cannot be read.
    pub error: Option<String>,
}

impl CheckpointInfo {
    /// First batch the next run will process.
    pub fn next_batch(&self) -> u64 {
        self.last_committed.map_or(0, |i| i + 1)
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No products found for: {}\n", results.query);
        }

        let mut output = String::new();
        let _ = writeln!(output, "Search results for: \"{}\"", results.query);
        let _ = writeln!(
            output,
            "Found {} products in {}ms\n",
            results.len(),
            results.duration_ms
        );

        for (i, hit) in results.hits.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} [Score: {:.3}]",
                i + 1,
                hit.name().unwrap_or("(unnamed)"),
                hit.score
            );
            let _ = writeln!(output, "   Id:     {}", hit.id);
            if let Some(price) = hit.price() {
                let _ = writeln!(
                    output,
                    "   Price:  {:.2} {}",
                    price,
                    hit.currency().unwrap_or("")
                );
            }
            if let Some(link) = hit.link() {
                let _ = writeln!(output, "   Link:   {}", link);
            }
            if let Some(image) = hit.images().first() {
                let _ = writeln!(output, "   Image:  {}", image);
            }
            let _ = writeln!(output);
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Status");
        let _ = writeln!(output, "------");
        let _ = writeln!(output, "Dataset:       {}", status.dataset_path.display());
        let _ = writeln!(output, "Checkpoint:    {}", status.checkpoint.path.display());
        match (&status.checkpoint.error, status.checkpoint.last_committed) {
            (Some(err), _) => {
                let _ = writeln!(output, "  Error:       {}", err);
            }
            (None, Some(index)) => {
                let _ = writeln!(output, "  Committed:   batch {}", index);
            }
            (None, None) => {
                let _ = writeln!(output, "  Committed:   none");
            }
        }
        let _ = writeln!(output, "  Next batch:  {}", status.checkpoint.next_batch());
        let _ = writeln!(output);

        let embedding_status = if status.embedding_healthy {
            "[HEALTHY]"
        } else {
            "[UNREACHABLE]"
        };
        let _ = writeln!(output, "Embedding:     {}", embedding_status);
        let _ = writeln!(output, "  URL:         {}", status.embedding_url);
        if let Some(ref model) = status.embedding_model {
            let _ = writeln!(output, "  Model:       {}", model);
        }
        let _ = writeln!(output);

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        let _ = writeln!(output, "Vector Store:  qdrant ({})", vector_status);
        let _ = writeln!(output, "  URL:         {}", status.vector_store_url);
        let _ = writeln!(output, "  Collection:  {}", status.collection);
        if status.vector_store_connected {
            match status.vector_store_points {
                Some(points) => {
                    let _ = writeln!(output, "  Points:      {}", points);
                }
                None => {
                    let _ = writeln!(output, "  Points:      (collection not created)");
                }
            }
        }

        output
    }

    fn format_ingest_summary(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Ingestion Complete");
        let _ = writeln!(output, "------------------");
        let _ = writeln!(output, "Started at batch:  {}", summary.start_index);
        let _ = writeln!(output, "Batches committed: {}", summary.batches_committed);
        let _ = writeln!(output, "Records upserted:  {}", summary.records_upserted);
        let _ = writeln!(output, "Records skipped:   {}", summary.records_skipped);
        match summary.last_committed {
            Some(index) => {
                let _ = writeln!(output, "Last committed:    batch {}", index);
            }
            None => {
                let _ = writeln!(output, "Last committed:    none");
            }
        }
        let _ = writeln!(output, "Duration:          {}ms", summary.elapsed.as_millis());
        output
    }

    fn format_ingest_failure(&self, failure: &PipelineFailure) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Ingestion failed: {}", failure.error);
        if let Some(batch) = failure.failing_batch {
            let _ = writeln!(output, "  Failing batch:        {}", batch);
        }
        match failure.last_committed {
            Some(index) => {
                let _ = writeln!(output, "  Last committed batch: {}", index);
                let _ = writeln!(output, "  A rerun resumes at batch {}.", index + 1);
            }
            None => {
                let _ = writeln!(output, "  Last committed batch: none");
                let _ = writeln!(output, "  A rerun starts from batch 0.");
            }
        }
        output
    }

    fn format_checkpoint(&self, checkpoint: &CheckpointInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Checkpoint: {}", checkpoint.path.display());
        if let Some(ref err) = checkpoint.error {
            let _ = writeln!(output, "  Error:      {}", err);
            return output;
        }
        match checkpoint.last_committed {
            Some(index) => {
                let _ = writeln!(output, "  Last committed batch: {}", index);
            }
            None => {
                let _ = writeln!(output, "  Nothing committed yet");
            }
        }
        let _ = writeln!(output, "  Next batch: {}", checkpoint.next_batch());
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut text = rendered.unwrap_or_else(|e| json!({"error": e.to_string()}).to_string());
        text.push('\n');
        text
    }
}

fn checkpoint_json(checkpoint: &CheckpointInfo) -> serde_json::Value {
    json!({
        "path": checkpoint.path,
        "last_committed": checkpoint.last_committed,
        "next_batch": checkpoint.next_batch(),
        "error": checkpoint.error,
    })
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        match serde_json::to_value(results) {
            Ok(value) => self.render(&value),
            Err(e) => self.format_error(&e.to_string()),
        }
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(&json!({
            "dataset": status.dataset_path,
            "checkpoint": checkpoint_json(&status.checkpoint),
            "embedding": {
                "url": status.embedding_url,
                "healthy": status.embedding_healthy,
                "model": status.embedding_model,
            },
            "vector_store": {
                "driver": "qdrant",
                "url": status.vector_store_url,
                "connected": status.vector_store_connected,
                "collection": status.collection,
                "points": status.vector_store_points,
            }
        }))
    }

    fn format_ingest_summary(&self, summary: &RunSummary) -> String {
        self.render(&json!({
            "status": "done",
            "start_index": summary.start_index,
            "batches_committed": summary.batches_committed,
            "records_upserted": summary.records_upserted,
            "records_skipped": summary.records_skipped,
            "last_committed": summary.last_committed,
            "duration_ms": summary.elapsed.as_millis() as u64,
        }))
    }

    fn format_ingest_failure(&self, failure: &PipelineFailure) -> String {
        self.render(&json!({
            "status": "failed",
            "error": failure.error.to_string(),
            "failing_batch": failure.failing_batch,
            "last_committed": failure.last_committed,
        }))
    }

    fn format_checkpoint(&self, checkpoint: &CheckpointInfo) -> String {
        self.render(&checkpoint_json(checkpoint))
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", json!({"error": error}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
