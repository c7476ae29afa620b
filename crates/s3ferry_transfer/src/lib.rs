pub mod orchestrator;

pub use orchestrator::{TransferConfig, TransferError, TransferOrchestrator};

use serde::{Deserialize, Serialize};
use std::fmt;

/// `IN_PROGRESS` is the sole initial state; `COMPLETED` and `FAILED` are
/// terminal and final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    InProgress,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::InProgress => "IN_PROGRESS",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::InProgress)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission body for one bucket-to-bucket copy. Missing JSON fields
/// deserialize to empty strings and fail validation in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub source_bucket: String,
    #[serde(default)]
    pub destination_bucket: String,
    #[serde(default)]
    pub file_key: String,
    /// Credential account to copy with; required once more than one
    /// credential record is stored.
    #[serde(default)]
    pub account: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::TransferStatus;

    #[test]
    fn status_serializes_to_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::InProgress).expect("serialize"),
            "\"IN_PROGRESS\""
        );
        assert_eq!(TransferStatus::Completed.as_str(), "COMPLETED");
        assert_eq!(TransferStatus::Failed.as_str(), "FAILED");
    }

    #[test]
    fn only_in_progress_is_non_terminal() {
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
    }
}
