use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy of a pipeline run.
///
/// Only fatal variants are ever returned from [`crate::pipeline::run`];
/// `MalformedPersistedState` is recovered locally and logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream snapshot unavailable: {0:#}")]
    UpstreamUnavailable(anyhow::Error),

    #[error("malformed persisted state: {0}")]
    MalformedPersistedState(String),

    #[error("failed to write {}: {cause:#}", .path.display())]
    SerializationFailure { path: PathBuf, cause: anyhow::Error },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::MalformedPersistedState(_))
    }
}
