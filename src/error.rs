//! Error taxonomy for the answer/summary pipeline.
//!
//! Two layers:
//!
//! - [`FailureReason`] / [`Failure`]: why a single provider attempt did not
//!   produce a usable result. Always non-terminal: the orchestrator moves on
//!   to the next provider and, ultimately, to the local extractive fallback.
//! - [`PipelineError`]: the only conditions a caller of
//!   [`Assistant`](crate::pipeline::Assistant) can observe.

use std::time::Duration;

use thiserror::Error;

use crate::models::PatientId;

/// Classified cause of a failed provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl FailureReason {
    /// Short machine-readable label, used in logs and the `failures` trail.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Timeout(_) => "timeout",
            FailureReason::Transport(_) => "transport",
            FailureReason::Auth(_) => "auth",
            FailureReason::RateLimited(_) => "rate_limited",
            FailureReason::MalformedResponse(_) => "malformed_response",
            FailureReason::NotConfigured(_) => "not_configured",
        }
    }
}

/// A provider attempt that ended without a valid result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider}: {reason}")]
pub struct Failure {
    pub provider: String,
    pub reason: FailureReason,
}

impl Failure {
    pub fn new(provider: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            provider: provider.into(),
            reason,
        }
    }
}

/// Caller-visible pipeline errors.
///
/// `EmptyContext` is the only failure of the pipeline proper; the other two
/// come from the persistence collaborator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient data: patient {0} has no notes or documents")]
    EmptyContext(PatientId),

    #[error("patient not found: {0}")]
    PatientNotFound(PatientId),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
