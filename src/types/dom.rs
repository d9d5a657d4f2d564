//! DOM snapshot types.
//!
//! Snapshots are produced by the capture driver (rrweb-style serialized trees)
//! and are treated as opaque JSON: the archive pipeline only needs to find
//! nodes carrying an `attributes` object and read/write their string values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// A serialized DOM tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomSnapshot(Value);

impl DomSnapshot {
    pub fn new(tree: Value) -> Self {
        Self(tree)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(serde_json::from_slice(bytes)?))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Visit every string-valued attribute of every node as `(name, value)`.
    pub fn for_each_attribute_mut(&mut self, mut f: impl FnMut(&str, &mut String)) {
        visit_attributes(&mut self.0, &mut f);
    }

    /// Collect every `(name, value)` attribute pair, in document order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut copy = self.clone();
        let mut out = Vec::new();
        copy.for_each_attribute_mut(|name, value| out.push((name.to_string(), value.clone())));
        out
    }
}

fn visit_attributes(node: &mut Value, f: &mut impl FnMut(&str, &mut String)) {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "attributes" {
                    if let Value::Object(attrs) = child {
                        for (name, value) in attrs.iter_mut() {
                            if let Value::String(value) = value {
                                f(name, value);
                            }
                        }
                        continue;
                    }
                }
                visit_attributes(child, f);
            }
        }
        Value::Array(items) => {
            for item in items {
                visit_attributes(item, f);
            }
        }
        _ => {}
    }
}

/// A DOM snapshot together with its display name (`"Snapshot #1"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSnapshot {
    pub name: String,
    pub dom: DomSnapshot,
}

impl NamedSnapshot {
    pub fn new(name: impl Into<String>, dom: DomSnapshot) -> Self {
        Self {
            name: name.into(),
            dom,
        }
    }

    /// Name snapshots by capture order, 1-based.
    pub fn numbered(snapshots: impl IntoIterator<Item = DomSnapshot>) -> Vec<NamedSnapshot> {
        snapshots
            .into_iter()
            .enumerate()
            .map(|(index, dom)| NamedSnapshot::new(format!("Snapshot #{}", index + 1), dom))
            .collect()
    }
}
