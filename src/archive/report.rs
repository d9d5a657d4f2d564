use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Summary of one `ArchiveWriter::write` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    pub title: String,
    pub run_dir: PathBuf,
    pub resources_written: usize,
    pub snapshots_written: usize,
    /// Resources the browser failed to fetch.
    pub capture_errors: usize,
    /// Items that were captured but could not be written, keyed by URL or
    /// `snapshot:<name>` / `stories:<title>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub write_errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl WriteReport {
    pub fn error_count(&self) -> usize {
        self.capture_errors + self.write_errors.len()
    }

    /// No capture or write failures and the latest pointer was published.
    pub fn is_clean(&self) -> bool {
        self.error_count() == 0 && self.pointer_error.is_none() && !self.cancelled
    }
}

pub(crate) fn snapshot_key(name: &str) -> String {
    format!("snapshot:{name}")
}

pub(crate) fn stories_key(title: &str) -> String {
    format!("stories:{title}")
}
