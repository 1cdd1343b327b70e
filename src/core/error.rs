use std::time::Duration;
use thiserror::Error;

use super::types::FailureKind;

/// Errors raised by the page-driver capability layer.
///
/// These are deliberately coarse: everything above the session layer only
/// needs to know whether the page is still usable, not which CDP call died.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("page is gone: {0}")]
    Closed(String),
}

/// The extraction engine's failure taxonomy (spec'd per search run).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("browser session could not be started: {0}")]
    SessionStart(String),

    #[error("results did not appear within {timeout:?}")]
    NavigationTimeout { timeout: Duration },

    #[error("blocking overlay '{overlay}' could not be dismissed within {waited:?}")]
    BlockingUi {
        overlay: &'static str,
        waited: Duration,
    },

    #[error("result list had {entries} entries but none could be parsed")]
    ExtractionIntegrity { entries: usize },

    #[error("search cancelled")]
    Cancelled,

    /// Transient page-level fault mid-step (tab crash, eval failure).
    /// Treated like a navigation hiccup: retry with a fresh session state.
    #[error("page fault: {0}")]
    Page(#[from] DriveError),
}

impl ExtractError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractError::SessionStart(_) => FailureKind::SessionStart,
            ExtractError::NavigationTimeout { .. } => FailureKind::NavigationTimeout,
            ExtractError::BlockingUi { .. } => FailureKind::BlockingUi,
            ExtractError::ExtractionIntegrity { .. } => FailureKind::ExtractionIntegrity,
            ExtractError::Cancelled => FailureKind::Cancelled,
            ExtractError::Page(_) => FailureKind::NavigationTimeout,
        }
    }

    /// Whether the orchestrator may retry this search with a session reset.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::NavigationTimeout { .. }
                | ExtractError::BlockingUi { .. }
                | ExtractError::Page(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(ExtractError::NavigationTimeout {
            timeout: Duration::from_secs(15)
        }
        .is_retryable());
        assert!(ExtractError::BlockingUi {
            overlay: "consent",
            waited: Duration::from_secs(5)
        }
        .is_retryable());
        assert!(!ExtractError::SessionStart("no browser".into()).is_retryable());
        assert!(!ExtractError::ExtractionIntegrity { entries: 12 }.is_retryable());
        assert!(!ExtractError::Cancelled.is_retryable());
    }

    #[test]
    fn kind_mapping_is_total() {
        let err = ExtractError::Page(DriveError::Closed("tab crashed".into()));
        assert_eq!(err.kind(), FailureKind::NavigationTimeout);
        assert_eq!(
            ExtractError::Cancelled.kind(),
            FailureKind::Cancelled
        );
    }
}
