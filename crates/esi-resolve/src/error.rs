//! Resolution errors.

use std::fmt;

use esi_fetch::FetchError;

/// Why a resolution call was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The inbound request was cancelled.
    RequestCancelled,
    /// The request or batch deadline passed.
    DeadlineExceeded,
    /// Another tag of the batch failed.
    BatchCancelled,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestCancelled => write!(f, "request cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::BatchCancelled => write!(f, "batch cancelled"),
        }
    }
}

/// Error returned instead of the fragments of a batch.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The backend fetch for one tag failed.
    #[error("fetch failed for entity {index} with tag {raw_tag:?}: {source}")]
    Fetch {
        index: usize,
        raw_tag: String,
        #[source]
        source: FetchError,
    },

    /// The batch was cancelled before every fragment was published.
    #[error("resolution cancelled: {reason}")]
    Cancelled {
        reason: CancelReason,
        /// Position of the tag whose worker observed the cancellation, if any.
        index: Option<usize>,
        /// Tag whose worker observed the cancellation, if any.
        raw_tag: Option<String>,
    },

    /// A worker stopped without reporting (panicked or was aborted).
    #[error("resolution worker for entity {index} with tag {raw_tag:?} failed: {message}")]
    Worker {
        index: usize,
        raw_tag: String,
        message: String,
    },
}

impl ResolveError {
    /// Whether the batch was cancelled rather than failed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Page position of the tag that failed, if known.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Fetch { index, .. } | Self::Worker { index, .. } => Some(*index),
            Self::Cancelled { index, .. } => *index,
        }
    }
}
