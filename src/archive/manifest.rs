//! On-disk JSON documents: the stories manifest and the error report.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::naming::snapshot_file_name;
use crate::types::StoryOptions;

/// `<title>.stories.json`, consumed by the Storybook server renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoriesFile {
    pub title: String,
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub name: String,
    pub parameters: StoryParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryParameters {
    pub server: ServerParameters,
    pub chromatic: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerParameters {
    /// Snapshot file name inside `archive/`.
    pub id: String,
}

impl StoriesFile {
    pub fn new<'a>(
        title: &str,
        snapshot_names: impl IntoIterator<Item = &'a str>,
        options: &StoryOptions,
    ) -> Self {
        let chromatic = options.chromatic_parameters();
        let stories = snapshot_names
            .into_iter()
            .map(|name| Story {
                name: name.to_string(),
                parameters: StoryParameters {
                    server: ServerParameters {
                        id: snapshot_file_name(title, name),
                    },
                    chromatic: chromatic.clone(),
                },
            })
            .collect();
        Self {
            title: title.to_string(),
            stories,
        }
    }
}

/// File name of the error report inside `archive/`.
pub const ERRORS_FILE: &str = "errors.json";

/// `archive/errors.json`. `errors` holds capture failures; `writeErrors`
/// holds files that were captured but could not be written and is omitted
/// when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub write_errors: BTreeMap<String, String>,
}

impl ErrorReport {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.write_errors.is_empty()
    }
}
