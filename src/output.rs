use crate::archive::WriteReport;
use crate::error::ErrorPayload;
use crate::types::Viewport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for output payloads.
pub const SNAPARC_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SnaparcOutput {
    Capture(CaptureOutput),
    Write(WriteOutput),
    Error(ErrorOutput),
}

impl SnaparcOutput {
    pub fn write(report: WriteReport) -> Self {
        SnaparcOutput::Write(WriteOutput {
            version: SNAPARC_OUTPUT_VERSION.to_string(),
            run_dir: report.run_dir.clone(),
            report,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutput {
    pub version: String,
    pub run_dir: PathBuf,
    pub report: WriteReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutput {
    pub version: String,
    /// URL that was requested.
    pub url: String,
    /// Page URL after redirects.
    pub page_url: String,
    pub viewport: Viewport,
    pub run_dir: PathBuf,
    pub report: WriteReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}
