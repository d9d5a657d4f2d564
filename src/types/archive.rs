//! Captured network resources for one page visit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Captured resources keyed by request URL.
///
/// A `BTreeMap` keeps iteration (and therefore path collision resolution)
/// deterministic regardless of the order responses arrived in.
pub type ResourceArchive = BTreeMap<String, ResourceEntry>;

/// Outcome of fetching one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceEntry {
    /// The fetch itself failed (DNS, reset, timeout, blocked...).
    Failure { error: String },
    /// Any HTTP response, including 4xx/5xx.
    Success {
        #[serde(default, with = "body_base64")]
        body: Vec<u8>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_status")]
        status: u16,
    },
}

fn default_status() -> u16 {
    200
}

impl ResourceEntry {
    pub fn success(status: u16, body: impl Into<Vec<u8>>) -> Self {
        ResourceEntry::Success {
            body: body.into(),
            headers: BTreeMap::new(),
            status,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ResourceEntry::Failure {
            error: error.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceEntry::Failure { .. })
    }

    /// Case-insensitive header lookup; `None` for failures.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            ResourceEntry::Success { headers, .. } => headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            ResourceEntry::Failure { .. } => None,
        }
    }
}

/// One event from the network driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkEvent {
    /// A request was issued; used only for in-flight accounting.
    Request { url: String },
    /// Terminal event for a request: either a response or a transport error.
    Response(ResponseEvent),
}

impl NetworkEvent {
    pub fn url(&self) -> &str {
        match self {
            NetworkEvent::Request { url } => url,
            NetworkEvent::Response(resp) => &resp.url,
        }
    }
}

/// Terminal event shape: `{ url, status?, headers?, body?, error? }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_body_base64"
    )]
    pub body: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEvent {
    /// A transport error wins over anything else the event carries; an HTTP
    /// error status is still a successful capture.
    pub fn into_entry(self) -> (String, ResourceEntry) {
        let entry = match self.error {
            Some(error) => ResourceEntry::Failure { error },
            None => ResourceEntry::Success {
                body: self.body.unwrap_or_default(),
                headers: self.headers.unwrap_or_default(),
                status: self.status.unwrap_or_else(default_status),
            },
        };
        (self.url, entry)
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod optional_body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
