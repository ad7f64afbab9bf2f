//! Error taxonomy for sync runs and query parsing.
//!
//! Per-run failures are [`SyncError`]s and abort the run. Per-record
//! failures never surface as errors: they are recorded as [`SkipReason`]s in
//! the run report and logged.

use std::fmt;
use thiserror::Error;

/// A sync run that could not complete.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The full-text engine is missing or unreadable. Nothing was written.
    #[error("full-text index unavailable: {0}")]
    EngineUnavailable(String),

    /// The busy flag is set: a full rebuild is running or did not finish.
    #[error("indexer is busy (a full rebuild is running or did not complete)")]
    Busy,

    /// An engine write, commit, catalog write or source query failed.
    /// The phase's watermark was not advanced.
    #[error("sync aborted during {phase}: {source}")]
    Aborted {
        phase: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    pub fn aborted(phase: impl fmt::Display, source: anyhow::Error) -> Self {
        SyncError::Aborted {
            phase: phase.to_string(),
            source,
        }
    }
}

/// Why a record or adapter was skipped during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The adapter could not enumerate its instances.
    AdapterMissing { doc_type: String, message: String },
    /// A single record could not be turned into a document.
    ExtractionFailure {
        doc_type: String,
        item_type: String,
        doc_id: String,
        message: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AdapterMissing { doc_type, message } => {
                write!(f, "adapter {} skipped: {}", doc_type, message)
            }
            SkipReason::ExtractionFailure {
                doc_type,
                item_type,
                doc_id,
                message,
            } => write!(
                f,
                "{}/{}#{} skipped: {}",
                doc_type, item_type, doc_id, message
            ),
        }
    }
}

/// Why a query string could not be turned into an engine query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty query")]
    Empty,
    #[error("query consists only of wildcard characters")]
    WildcardOnly,
    #[error("query has no term that documents could match")]
    NoPositiveTerm,
}
