use std::fmt;

/// Where the ingestion control path currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Loading the checkpoint and preparing the collection.
    Init,
    /// Positioning the dataset at the first uncommitted batch.
    Resuming,
    /// Waiting for, or upserting, batch `i`.
    Processing(u64),
    /// Durably recording batch `i` as committed.
    Committing(u64),
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (*self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Init, Resuming) => true,
            (Resuming, Processing(_)) => true,
            (Processing(i), Committing(j)) => i == j,
            (Processing(_), Done) => true,
            (Committing(i), Processing(j)) => j == i + 1,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => f.write_str("INIT"),
            PipelineState::Resuming => f.write_str("RESUMING"),
            PipelineState::Processing(i) => write!(f, "PROCESSING({i})"),
            PipelineState::Committing(i) => write!(f, "COMMITTING({i})"),
            PipelineState::Done => f.write_str("DONE"),
            PipelineState::Failed => f.write_str("FAILED"),
        }
    }
}
