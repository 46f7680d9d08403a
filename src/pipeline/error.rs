//! Error taxonomy for ingestion and queries
//!
//! - `MalformedEvent`: the event is dropped, nothing is written
//! - `StoreUnavailable`: a write failed; ingestion must halt
//! - `QueryFailure`: a read failed; surfaced to the caller

#[derive(Debug)]
pub enum PipelineError {
    MalformedEvent(String),
    StoreUnavailable(String),
    QueryFailure(String),
}

impl PipelineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        PipelineError::MalformedEvent(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::StoreUnavailable(_))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::MalformedEvent(err.to_string())
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::MalformedEvent(msg) => write!(f, "Malformed event: {}", msg),
            PipelineError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            PipelineError::QueryFailure(msg) => write!(f, "Query failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

pub type PipelineResult<T> = Result<T, PipelineError>;
