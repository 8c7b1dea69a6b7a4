use std::num::NonZeroUsize;

use tracing::{debug, warn};

use crate::dataset::RecordSource;
use crate::error::DatasetError;
use crate::models::Batch;

/// Groups a record source into consecutive, index-tagged batches.
///
/// Batch `i` always covers records `[i * size, (i + 1) * size)` of the dataset,
/// whether the batcher started at the beginning or was resumed.
pub struct Batcher<S> {
    source: S,
    batch_size: NonZeroUsize,
    next_index: u64,
    exhausted: bool,
}

impl<S: RecordSource> Batcher<S> {
    /// Start at batch 0 on a freshly opened source.
    pub fn new(source: S, batch_size: NonZeroUsize) -> Self {
        Self {
            source,
            batch_size,
            next_index: 0,
            exhausted: false,
        }
    }

    /// Position the source at the first record of `start_index` and continue from there.
    pub fn resume(
        mut source: S,
        batch_size: NonZeroUsize,
        start_index: u64,
    ) -> Result<Self, DatasetError> {
        let target = start_index.saturating_mul(batch_size.get() as u64);
        let behind = target.saturating_sub(source.position());
        let skipped = source.skip(behind)?;
        if skipped < behind {
            warn!(
                start_index,
                expected = target,
                available = source.position(),
                "dataset ends before the resume point"
            );
        } else if skipped > 0 {
            debug!(start_index, skipped, "skipped committed records");
        }
        Ok(Self {
            source,
            batch_size,
            next_index: start_index,
            exhausted: false,
        })
    }

    /// Index the next returned batch will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn next_batch(&mut self) -> Result<Option<Batch>, DatasetError> {
        if self.exhausted {
            return Ok(None);
        }
        let record_offset = self.source.position();
        let records = match self.source.next_batch(self.batch_size.get()) {
            Ok(Some(records)) => records,
            Ok(None) => {
                self.exhausted = true;
                return Ok(None);
            }
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };
        if records.len() < self.batch_size.get() {
            self.exhausted = true;
        }

        let batch = Batch {
            index: self.next_index,
            record_offset,
            records,
        };
        self.next_index += 1;
        Ok(Some(batch))
    }
}

impl<S: RecordSource> Iterator for Batcher<S> {
    type Item = Result<Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}
