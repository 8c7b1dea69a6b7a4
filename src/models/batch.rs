use super::product::Record;

/// An ordered group of records processed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based position of this batch in the dataset.
    pub index: u64,
    /// Dataset offset of the first record.
    pub record_offset: u64,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offset one past the last record of this batch.
    pub fn end_offset(&self) -> u64 {
        self.record_offset + self.records.len() as u64
    }
}
