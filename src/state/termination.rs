use serde::Serialize;
use std::fmt;

/// Termination reasons for a crawl session
///
/// Every session ends in exactly one of these. The reason always travels with the
/// records that were accumulated, so callers can tell a complete sweep from an
/// aborted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    // ===== Natural Ends =====
    /// The upstream reported no further pages
    Complete,

    /// The configured item limit was reached
    QuantityReached,

    /// Incremental mode met an item stored by a previous run
    SyncBoundary,

    // ===== Limits =====
    /// The page cap was reached while more pages remained
    PageLimit,

    /// Too many consecutive pages exhausted their retries
    FailureStreak,

    // ===== Fatal =====
    /// The first page failed and nothing was collected
    NoData,

    /// The caller cancelled the session
    Cancelled,
}

impl TerminationReason {
    /// Returns true if the session stopped because of upstream failures
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailureStreak | Self::NoData)
    }

    /// Converts the reason to its stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::QuantityReached => "quantity_reached",
            Self::SyncBoundary => "sync_boundary",
            Self::PageLimit => "page_limit",
            Self::FailureStreak => "failure_streak",
            Self::NoData => "no_data",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
