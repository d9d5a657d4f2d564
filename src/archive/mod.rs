//! Writing captured test results to disk as a browsable, self-contained
//! archive.
//!
//! [`resolve_all`] assigns each captured resource a unique path, [`rewrite`]
//! points snapshot asset references at those paths, and [`ArchiveWriter`]
//! ties both together and publishes the `latest` pointer.

mod manifest;
mod path;
mod pointer;
mod report;
mod rewrite;
mod writer;

use std::collections::HashMap;

/// Asset reference as it appears in a snapshot, mapped to the relative path
/// of the archived file.
pub type SourceMap = HashMap<String, String>;

pub use manifest::{
    ErrorReport, ServerParameters, StoriesFile, Story, StoryParameters, ERRORS_FILE,
};
pub use path::{
    resolve, resolve_all, resolve_within, ArchivedFile, OccupiedPaths, ResolvedArchive,
};
pub use pointer::{publish_latest, LATEST_POINTER};
pub use report::WriteReport;
pub use rewrite::rewrite;
pub use writer::{ArchiveWriter, WriterOptions, ARCHIVE_DIR, DEFAULT_MAX_CONCURRENT_WRITES};
