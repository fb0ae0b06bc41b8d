use crate::job::JobState;
use serde::Serialize;

/// Fatal conditions that end a job in the `Failed` state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("{resource} is unavailable: {reason}")]
    ResourceUnavailable { resource: String, reason: String },
    #[error("Entity recognition failed: {0}")]
    Inference(String),
    #[error("Invalid job transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },
    #[error("Analysis worker stopped unexpectedly: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn unavailable(resource: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Why a stage stopped early. Cancellation is not a failure, so it is kept
/// apart from `PipelineError` and only merged into `JobOutcome` at the end.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Halt {
    Cancelled,
    Failed(PipelineError),
}

impl From<PipelineError> for Halt {
    fn from(err: PipelineError) -> Self {
        Halt::Failed(err)
    }
}
