//! Lazy, restartable access to the product dataset.
//!
//! A [`DatasetCursor`] owns the read position; the source itself keeps no state
//! between runs. Resuming is `open` followed by `skip`.

mod scanner;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::DatasetError;
use crate::models::{DatasetFormat, Record, RecordId};

use scanner::{ArrayScanner, Element, LineScanner};

/// Anything the batcher can pull ordered records from.
pub trait RecordSource {
    /// Advance past the next `n` records without building them.
    /// Returns how many were actually skipped (fewer at end of data).
    fn skip(&mut self, n: u64) -> Result<u64, DatasetError>;

    /// Up to `size` next records in dataset order, or `None` at end of data.
    fn next_batch(&mut self, size: usize) -> Result<Option<Vec<Record>>, DatasetError>;

    /// Number of records consumed so far, skipped ones included.
    fn position(&self) -> u64;
}

enum Reader<R> {
    Lines(LineScanner<R>),
    Array(ArrayScanner<R>),
}

impl<R: BufRead> Reader<R> {
    fn next_element(&mut self, keep: bool) -> std::io::Result<Option<Element>> {
        match self {
            Reader::Lines(s) => s.next_element(keep),
            Reader::Array(s) => s.next_element(keep),
        }
    }
}

/// Read cursor over one dataset file.
pub struct DatasetCursor<R = BufReader<File>> {
    reader: Reader<R>,
    position: u64,
    seen_ids: HashSet<RecordId>,
}

/// Open the dataset at `path`.
pub fn open(path: &Path, format: DatasetFormat) -> Result<DatasetCursor, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::Missing(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let format = match format {
        DatasetFormat::Auto => match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                DatasetFormat::Jsonl
            }
            _ => DatasetFormat::Auto,
        },
        other => other,
    };
    debug!(path = %path.display(), ?format, "opening dataset");
    DatasetCursor::from_reader(BufReader::new(file), format)
}

impl<R: BufRead> DatasetCursor<R> {
    /// Wrap an already-open reader. `Auto` looks at the first significant byte.
    pub fn from_reader(mut reader: R, format: DatasetFormat) -> Result<Self, DatasetError> {
        let format = match format {
            DatasetFormat::Auto => detect_format(&mut reader)?,
            other => other,
        };
        let reader = match format {
            DatasetFormat::Json => Reader::Array(ArrayScanner::new(reader)),
            DatasetFormat::Jsonl | DatasetFormat::Auto => Reader::Lines(LineScanner::new(reader)),
        };
        Ok(Self {
            reader,
            position: 0,
            seen_ids: HashSet::new(),
        })
    }

    fn read_next(&mut self) -> Result<Option<Record>, DatasetError> {
        let offset = self.position;
        let element = match self.reader.next_element(true)? {
            None => return Ok(None),
            Some(element) => element,
        };
        self.position += 1;

        let bytes = match element {
            Element::Bytes(bytes) => bytes,
            Element::NotAnObject | Element::Skipped => {
                return Err(DatasetError::Shape {
                    offset,
                    reason: "record must be a JSON object".to_string(),
                });
            }
        };

        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|source| DatasetError::Malformed { offset, source })?;
        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        if !has_id {
            return Err(DatasetError::Shape {
                offset,
                reason: "missing required field `id`".to_string(),
            });
        }
        let record: Record = serde_json::from_value(value).map_err(|e| DatasetError::Shape {
            offset,
            reason: e.to_string(),
        })?;
        if matches!(&record.id, RecordId::Str(s) if s.trim().is_empty()) {
            return Err(DatasetError::Shape {
                offset,
                reason: "`id` must not be empty".to_string(),
            });
        }
        if !self.seen_ids.insert(record.id.clone()) {
            return Err(DatasetError::DuplicateId {
                id: record.id.to_string(),
                offset,
            });
        }
        Ok(Some(record))
    }
}

impl<R: BufRead> RecordSource for DatasetCursor<R> {
    fn skip(&mut self, n: u64) -> Result<u64, DatasetError> {
        let mut skipped = 0;
        while skipped < n {
            if self.reader.next_element(false)?.is_none() {
                break;
            }
            skipped += 1;
            self.position += 1;
        }
        Ok(skipped)
    }

    fn next_batch(&mut self, size: usize) -> Result<Option<Vec<Record>>, DatasetError> {
        let mut records = Vec::with_capacity(size.min(1024));
        while records.len() < size {
            match self.read_next()? {
                Some(record) => records.push(record),
                None => break,
            }
        }
        Ok(if records.is_empty() { None } else { Some(records) })
    }

    fn position(&self) -> u64 {
        self.position
    }
}

fn detect_format<R: BufRead>(reader: &mut R) -> Result<DatasetFormat, DatasetError> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(DatasetFormat::Jsonl);
        }
        let whitespace = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if whitespace < buf.len() {
            let format = if buf[whitespace] == b'[' {
                DatasetFormat::Json
            } else {
                DatasetFormat::Jsonl
            };
            reader.consume(whitespace);
            return Ok(format);
        }
        let len = buf.len();
        reader.consume(len);
    }
}
