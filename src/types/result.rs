use serde::{Deserialize, Serialize};

use super::archive::ResourceArchive;
use super::dom::NamedSnapshot;
use super::options::StoryOptions;

/// Everything captured for one test, handed to the archive writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Story title; `/` separates hierarchy levels.
    pub title: String,
    /// URL of the visited page, used to resolve same-origin resources.
    pub page_url: String,
    #[serde(default)]
    pub snapshots: Vec<NamedSnapshot>,
    #[serde(default)]
    pub archive: ResourceArchive,
    #[serde(default)]
    pub options: StoryOptions,
}

impl TestResult {
    pub fn new(title: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            page_url: page_url.into(),
            ..Default::default()
        }
    }
}
