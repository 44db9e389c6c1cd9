use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AutomationError {
    #[error("Timed out after {elapsed:?} waiting on '{selector}'")]
    Timeout { selector: String, elapsed: Duration },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Malformed program: {0}")]
    Malformed(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Metadata extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Automation stopped: {0}")]
    StopRequested(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn timeout(selector: impl Into<String>, elapsed: Duration) -> Self {
        AutomationError::Timeout {
            selector: selector.into(),
            elapsed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::Timeout { .. }
                | AutomationError::ElementNotFound(_)
                | AutomationError::NavigationFailed(_)
                | AutomationError::ExtractionFailed(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AutomationError::ElementNotFound(_) => ErrorSeverity::Low,
            AutomationError::ExtractionFailed(_) => ErrorSeverity::Low,
            AutomationError::Malformed(_) => ErrorSeverity::High,
            AutomationError::InvalidCondition(_) => ErrorSeverity::High,
            AutomationError::StopRequested(_) => ErrorSeverity::High,
            AutomationError::Cancelled => ErrorSeverity::High,
            AutomationError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Short kind label used in log lines and failure summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationError::Timeout { .. } => "Timeout",
            AutomationError::ElementNotFound(_) => "ElementNotFound",
            AutomationError::Malformed(_) => "Malformed",
            AutomationError::InvalidCondition(_) => "InvalidCondition",
            AutomationError::DownloadFailed(_) => "DownloadFailed",
            AutomationError::ExtractionFailed(_) => "ExtractionFailed",
            AutomationError::NavigationFailed(_) => "NavigationFailed",
            AutomationError::Cancelled => "Cancelled",
            AutomationError::StopRequested(_) => "StopRequested",
            AutomationError::Internal(_) => "Internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured record of a failure, suitable for the ERROR log and for
/// appending to a user-named log file.
#[derive(Debug, Clone)]
pub struct FailureSummary {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub action_index: usize,
    pub kind: &'static str,
    pub message: String,
    pub selector: Option<String>,
    pub elapsed: Duration,
}

impl FailureSummary {
    pub fn new(action_index: usize, error: &AutomationError, elapsed: Duration) -> Self {
        let selector = match error {
            AutomationError::Timeout { selector, .. } => Some(selector.clone()),
            AutomationError::ElementNotFound(selector) => Some(selector.clone()),
            _ => None,
        };

        Self {
            timestamp: chrono::Utc::now(),
            action_index,
            kind: error.kind(),
            message: error.to_string(),
            selector,
            elapsed,
        }
    }
}

impl std::fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] action #{} failed: {} ({}), selector={}, elapsed={:?}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action_index,
            self.message,
            self.kind,
            self.selector.as_deref().unwrap_or("-"),
            self.elapsed
        )
    }
}

impl From<std::io::Error> for AutomationError {
    fn from(err: std::io::Error) -> Self {
        AutomationError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(err: serde_json::Error) -> Self {
        AutomationError::Malformed(err.to_string())
    }
}

impl From<serde_yaml::Error> for AutomationError {
    fn from(err: serde_yaml::Error) -> Self {
        AutomationError::Malformed(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for AutomationError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AutomationError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(AutomationError::timeout("#go", Duration::from_secs(1)).is_retryable());
        assert!(AutomationError::ElementNotFound("#x".into()).is_retryable());
        assert!(!AutomationError::Malformed("bad".into()).is_retryable());
        assert!(!AutomationError::StopRequested("queue full".into()).is_retryable());
        assert!(!AutomationError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            AutomationError::ElementNotFound("#x".into()).severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AutomationError::Malformed("bad".into()).severity(),
            ErrorSeverity::High
        );
        assert_eq!(
            AutomationError::Internal("boom".into()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            AutomationError::DownloadFailed("x".into()).severity(),
            ErrorSeverity::Medium
        );
    }

    #[test]
    fn test_failure_summary_carries_selector() {
        let err = AutomationError::timeout("#submit", Duration::from_millis(1500));
        let summary = FailureSummary::new(7, &err, Duration::from_millis(1500));
        assert_eq!(summary.action_index, 7);
        assert_eq!(summary.kind, "Timeout");
        assert_eq!(summary.selector.as_deref(), Some("#submit"));
        let line = summary.to_string();
        assert!(line.contains("action #7"));
        assert!(line.contains("#submit"));
    }
}
