//! Error taxonomy for the cognitive pipeline.
//!
//! Every component returns structured results; errors carry a
//! machine-readable [`ErrorKind`] so phases can decide between retry,
//! degradation, and fatal propagation without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error classification.
///
/// The kinds mirror the retry/propagation policy table: transient errors are
/// retried with backoff, structured-parse errors are retried with a reminder
/// prompt, invariant and budget errors are fatal for their phase, compliance
/// findings feed the repair loop, and external-dependency errors degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failures, rate limits, timeouts. Retried with backoff.
    Transient,
    /// LLM output did not match the required schema. Retried with a reminder.
    StructuredParse,
    /// Broken invariant (cycle, duplicate definition, plan violation). Fatal.
    Invariant,
    /// Token, time, or iteration cap exceeded. Fatal for the operation.
    Budget,
    /// Missing entities/endpoints/validations. Fed into the repair loop.
    Compliance,
    /// A consumed service is unavailable. Degrade where possible.
    External,
    /// The run's cancellation token was tripped.
    Cancelled,
    /// Local I/O or serialization failure.
    Io,
}

/// Errors produced by the cognitive pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No entities could be extracted from the specification
    #[error("malformed specification: {0}")]
    SpecMalformed(String),

    /// The specification exceeds the ingestion size cap
    #[error("specification too large: {size} bytes exceeds the {limit} byte cap")]
    SpecTooLarge {
        /// Observed document size in bytes
        size: usize,
        /// Configured cap
        limit: usize,
    },

    /// Network-level failure talking to a consumed service
    #[error("network failure: {0}")]
    Network(String),

    /// The consumed service rejected the call for rate reasons
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// An operation exceeded its deadline
    #[error("timeout after {elapsed_ms}ms: {operation}")]
    Timeout {
        /// What was being awaited
        operation: String,
        /// Elapsed wall-clock milliseconds
        elapsed_ms: u64,
    },

    /// The LLM refused the request on content grounds. Terminal for the call.
    #[error("content policy refusal: {0}")]
    ContentPolicy(String),

    /// LLM output failed to parse against the required structure
    #[error("structured parse failure: {0}")]
    StructuredParse(String),

    /// A component invariant was violated
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The task graph contains a cycle
    #[error("cycle detected in task graph: {}", chain.join(" -> "))]
    DagCyclic {
        /// The offending chain of task ids, ending at the revisited node
        chain: Vec<String>,
    },

    /// A task names a predecessor that does not exist
    #[error("task '{task}' declares unknown predecessor '{predecessor}'")]
    UnknownPredecessor {
        /// Declaring task id
        task: String,
        /// Missing predecessor id
        predecessor: String,
    },

    /// Multi-pass planning could not converge within its retry budget
    #[error("planning failed: {0}")]
    PlanningFailed(String),

    /// A token, time, or iteration budget was exhausted
    #[error("budget exhausted: {0}")]
    Budget(String),

    /// Extraction produced nothing and the run demanded a coverage floor
    #[error("minimum coverage not met: achieved {achieved:.3}, required {required:.3}")]
    MinimumCoverage {
        /// Coverage fraction achieved
        achieved: f64,
        /// Coverage floor demanded by the run context
        required: f64,
    },

    /// A consumed external dependency is unavailable
    #[error("external dependency unavailable: {0}")]
    External(String),

    /// The run was cooperatively cancelled
    #[error("run cancelled")]
    Cancelled,

    /// A file-map path failed normalization
    #[error("invalid artifact path '{0}': paths must be relative, without '..'")]
    InvalidPath(String),

    /// Local filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure outside of LLM responses
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The machine-readable classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::RateLimited(_) | Error::Timeout { .. } => {
                ErrorKind::Transient
            }
            Error::StructuredParse(_) => ErrorKind::StructuredParse,
            Error::SpecMalformed(_)
            | Error::Invariant(_)
            | Error::DagCyclic { .. }
            | Error::UnknownPredecessor { .. }
            | Error::PlanningFailed(_)
            | Error::InvalidPath(_) => ErrorKind::Invariant,
            Error::SpecTooLarge { .. } | Error::Budget(_) => ErrorKind::Budget,
            Error::MinimumCoverage { .. } => ErrorKind::Compliance,
            Error::ContentPolicy(_) | Error::External(_) => ErrorKind::External,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) | Error::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Whether this error terminates its phase (no retry, no degradation).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Invariant | ErrorKind::Budget | ErrorKind::Cancelled
        )
    }
}
