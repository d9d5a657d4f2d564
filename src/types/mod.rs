//! Core types shared by the watcher, the capture driver and the writer.
//!
//! - [`ResourceArchive`] / [`ResourceEntry`] - captured network responses
//! - [`NetworkEvent`] - driver event stream items
//! - [`DomSnapshot`] / [`NamedSnapshot`] - serialized DOM trees
//! - [`TestResult`] - the unit handed to the archive writer
//! - [`StoryOptions`] / [`Viewport`] - presentation parameters

mod archive;
mod dom;
mod options;
mod result;

pub use archive::{NetworkEvent, ResourceArchive, ResourceEntry, ResponseEvent};
pub use dom::{DomSnapshot, NamedSnapshot};
pub use options::{StoryOptions, Viewport, ViewportParseError};
pub use result::TestResult;
