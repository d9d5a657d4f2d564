//! Browser capture driver.
//!
//! Runs a Playwright script under Node.js that streams network events and
//! DOM snapshots back as JSON lines. Network events are fed into a
//! [`ResourceWatcher`](crate::watcher::ResourceWatcher), whose idle signal
//! decides when the snapshot is taken.
//!
//! # Module Structure
//!
//! - [`capture`] - page visit orchestration and options
//! - [`playwright`] - capture script and availability checks
//! - [`protocol`] - driver output lines
//!
//! # Example
//!
//! ```no_run
//! use snaparc_lib::{CaptureOptions, PlaywrightCapture, StoryOptions};
//!
//! # async fn example() -> snaparc_lib::Result<()> {
//! let capture = PlaywrightCapture::new(CaptureOptions::default());
//! let page = capture.capture("https://example.com").await?;
//! let result = page.into_test_result("home/renders", StoryOptions::default());
//! println!("{} resources", result.archive.len());
//! # Ok(())
//! # }
//! ```

mod capture;
mod playwright;
mod protocol;

pub use capture::{
    CaptureOptions, PageCapture, PlaywrightCapture, ProgressCallback, DEFAULT_NAVIGATION_TIMEOUT,
    DEFAULT_NETWORK_IDLE_TIMEOUT, DEFAULT_PROCESS_TIMEOUT, DEFAULT_QUIET_PERIOD,
};
