use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

/// Browser viewport used for capture and recorded in the stories manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1280x720)")]
    InvalidFormat,
    #[error("Invalid {axis}: {value}")]
    InvalidNumber { axis: &'static str, value: String },
    #[error("Viewport {0} must be positive")]
    Zero(&'static str),
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if h.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }

        let parse_axis = |axis: &'static str, raw: &str| -> Result<u32, ViewportParseError> {
            let value: u32 = raw
                .trim()
                .parse()
                .map_err(|_| ViewportParseError::InvalidNumber {
                    axis,
                    value: raw.to_string(),
                })?;
            if value == 0 {
                return Err(ViewportParseError::Zero(axis));
            }
            Ok(value)
        };

        Ok(Viewport {
            width: parse_axis("width", w)?,
            height: parse_axis("height", h)?,
        })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Caller-supplied presentation options copied into every story's
/// `parameters.chromatic` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Arbitrary pass-through parameters (delay, diffThreshold, ...).
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl StoryOptions {
    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            viewport: Some(viewport),
            extra: Map::new(),
        }
    }

    /// Build the `chromatic` parameters object. A viewport becomes
    /// `modes.viewport`, merged into any `modes` the caller passed through.
    pub fn chromatic_parameters(&self) -> Value {
        let mut params = self.extra.clone();
        if let Some(viewport) = self.viewport {
            let mode = serde_json::json!({
                "width": viewport.width,
                "height": viewport.height,
            });
            match params.get_mut("modes") {
                Some(Value::Object(modes)) => {
                    modes.insert("viewport".to_string(), mode);
                }
                _ => {
                    params.insert(
                        "modes".to_string(),
                        serde_json::json!({ "viewport": mode }),
                    );
                }
            }
        }
        Value::Object(params)
    }
}
