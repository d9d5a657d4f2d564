//! Snapshot Archiver (snaparc) Library
//!
//! Captures the network resources and DOM state of a page visit inside a
//! browser test and writes them out as a self-contained archive that a
//! Storybook server renderer can replay for visual-regression comparison.
//!
//! # Module Overview
//!
//! - [`watcher`] - accumulate network events and detect network idle
//! - [`session`] - per-test-run watcher registry
//! - [`browser`] - Playwright capture driver
//! - [`archive`] - path resolution, snapshot rewriting, on-disk writer
//! - [`naming`] - sanitized names, story titles, run ids
//! - [`config`] - configuration file support
//! - [`types`] - core data types
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use snaparc_lib::{ArchiveWriter, DomSnapshot, NamedSnapshot, ResourceEntry, TestResult, WriterOptions};
//!
//! # async fn example() -> snaparc_lib::Result<()> {
//! let mut result = TestResult::new("My Test", "http://localhost:3000/");
//! result.archive.insert(
//!     "http://localhost:3000/logo.png".into(),
//!     ResourceEntry::success(200, std::fs::read("logo.png")?),
//! );
//! result.snapshots = NamedSnapshot::numbered([DomSnapshot::new(serde_json::json!({}))]);
//!
//! let writer = ArchiveWriter::new("./test-archives", WriterOptions::default());
//! let report = writer.write(result).await?;
//! println!("{} files in {}", report.resources_written, report.run_dir.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod browser;
pub mod config;
pub mod error;
pub mod naming;
pub mod output;
pub mod session;
pub mod types;
pub mod watcher;

pub use archive::{
    publish_latest, resolve, resolve_all, resolve_within, rewrite, ArchiveWriter, ArchivedFile,
    ErrorReport, OccupiedPaths, ResolvedArchive, SourceMap, StoriesFile, WriteReport,
    WriterOptions, ARCHIVE_DIR, DEFAULT_MAX_CONCURRENT_WRITES, ERRORS_FILE, LATEST_POINTER,
};
pub use browser::{CaptureOptions, PageCapture, PlaywrightCapture, ProgressCallback};
pub use config::{Config, ConfigError};
pub use error::{ArchiveError, ErrorCategory, ErrorPayload, Result};
pub use naming::{sanitize, story_title};
pub use output::{CaptureOutput, ErrorOutput, SnaparcOutput, WriteOutput, SNAPARC_OUTPUT_VERSION};
pub use session::CaptureSessions;
pub use types::{
    DomSnapshot, NamedSnapshot, NetworkEvent, ResourceArchive, ResourceEntry, ResponseEvent,
    StoryOptions, TestResult, Viewport,
};
pub use watcher::{Activity, ResourceWatcher};
