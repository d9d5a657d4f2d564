use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot create output directory {}: {source}", path.display())]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to update latest pointer {}: {message}", path.display())]
    PointerSwap { path: PathBuf, message: String },

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Write cancelled before completion")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl ArchiveError {
    pub fn output_root(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::OutputRoot {
            path: path.into(),
            source,
        }
    }

    pub fn pointer_swap(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ArchiveError::PointerSwap {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        ArchiveError::Capture(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            ArchiveError::Io(e) => ErrorPayload::new(
                ErrorCategory::Io,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            ArchiveError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            ArchiveError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check the JSON input shape; run with --verbose for details.",
            ),
            ArchiveError::OutputRoot { .. } => ErrorPayload::new(
                ErrorCategory::Output,
                self.to_string(),
                "Check that the output root is writable and the disk has free space (set OUTPUT_DIR or --output-root).",
            ),
            ArchiveError::PointerSwap { .. } => ErrorPayload::new(
                ErrorCategory::Output,
                self.to_string(),
                "The run directory is still valid; remove the stale `latest` entry manually and rerun.",
            ),
            ArchiveError::Capture(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("playwright npm package is missing") {
                    ErrorPayload::new(
                        ErrorCategory::Capture,
                        msg.to_string(),
                        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`).",
                    )
                } else if lower.contains("not found on path") || lower.contains("node command") {
                    ErrorPayload::new(
                        ErrorCategory::Capture,
                        msg.to_string(),
                        "Install Node.js and ensure the node binary is on PATH.",
                    )
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    ErrorPayload::new(
                        ErrorCategory::Capture,
                        msg.to_string(),
                        "Try increasing --nav-timeout/--process-timeout or ensure the page loads without blocking.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Capture,
                        msg.to_string(),
                        "Re-run with --verbose to see the driver output.",
                    )
                }
            }
            ArchiveError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check flags/paths (e.g., --viewport WIDTHxHEIGHT) and the config file.",
            ),
            ArchiveError::Cancelled => ErrorPayload::new(
                ErrorCategory::Output,
                self.to_string(),
                "The run directory may be incomplete; rerun the capture.",
            ),
            ArchiveError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Capture,
    Io,
    Output,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
