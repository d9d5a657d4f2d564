//! Materializes a [`TestResult`] into a run directory.
//!
//! Layout, relative to the output root:
//!
//! ```text
//! latest -> <run-id>
//! <run-id>/<title>.stories.json
//! <run-id>/archive/<resolved resource paths>
//! <run-id>/archive/<title>-<snapshot>.snapshot.json
//! <run-id>/archive/errors.json          (only when something failed)
//! ```

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::manifest::{ErrorReport, StoriesFile, ERRORS_FILE};
use super::path::{resolve_within, OccupiedPaths};
use super::pointer::publish_latest;
use super::report::{snapshot_key, stories_key, WriteReport};
use super::rewrite::rewrite;
use crate::naming::{new_run_id, snapshot_file_name, stories_file_name};
use crate::types::{ResourceEntry, TestResult};
use crate::{ArchiveError, Result};

pub const ARCHIVE_DIR: &str = "archive";
pub const DEFAULT_MAX_CONCURRENT_WRITES: usize = 16;

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Upper bound on files being written at once.
    pub max_concurrent_writes: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
        }
    }
}

/// State shared by every result written into the same run directory.
#[derive(Debug, Default)]
struct RunState {
    /// Snapshot and stories file names already used in this run.
    claimed: HashSet<String>,
    /// Resource paths inside `archive/`, shared by every result in the run.
    occupied: OccupiedPaths,
    /// Cumulative contents of `errors.json`.
    errors: ErrorReport,
}

/// Writes test results into one run directory under an output root.
///
/// The run id is fixed when the writer is created, so every result written
/// through the same writer lands in the same `<run-id>` directory.
#[derive(Debug)]
pub struct ArchiveWriter {
    output_root: PathBuf,
    run_id: String,
    options: WriterOptions,
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

enum Outcome {
    Resource { url: String, result: Result<()> },
    Snapshot { name: String, result: Result<()> },
}

impl ArchiveWriter {
    pub fn new(output_root: impl Into<PathBuf>, options: WriterOptions) -> Self {
        Self::with_run_id(output_root, new_run_id(), options)
    }

    pub fn with_run_id(
        output_root: impl Into<PathBuf>,
        run_id: impl Into<String>,
        options: WriterOptions,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            run_id: run_id.into(),
            options,
            cancel: CancellationToken::new(),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_id)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.run_dir().join(ARCHIVE_DIR)
    }

    /// Cancelling the token abandons outstanding file writes; the run's
    /// `latest` pointer is then left untouched.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Write one test result.
    ///
    /// Only a failure to create the output directories is returned as an
    /// error. Capture failures, individual write failures and pointer update
    /// failures are recorded in the returned [`WriteReport`].
    pub async fn write(&self, result: TestResult) -> Result<WriteReport> {
        let run_dir = self.run_dir();
        let archive_dir = self.archive_dir();
        self.ensure_dirs(&run_dir, &archive_dir).await?;

        let TestResult {
            title,
            page_url,
            snapshots,
            mut archive,
            options,
        } = result;
        info!(run_dir = %run_dir.display(), "Writing test results for \"{title}\"");

        let mut report = WriteReport {
            title: title.clone(),
            run_dir: run_dir.clone(),
            ..Default::default()
        };

        // Every path is resolved before any snapshot is rewritten. Paths are
        // claimed under the lock so results sharing the run never collide.
        let mut resolved = {
            let mut state = self.state.lock().await;
            let resolved = resolve_within(&archive, &page_url, &state.occupied);
            for file in &resolved.files {
                state.occupied.claim(&file.relative_path, &file.url);
            }
            resolved
        };
        let files = std::mem::take(&mut resolved.files);
        let failures = std::mem::take(&mut resolved.failures);
        for url in std::mem::take(&mut resolved.unresolved) {
            warn!(%url, "resource URL has no archivable path");
            report
                .write_errors
                .insert(url, "URL has no path that can be archived".to_string());
        }
        let source_map = Arc::new(resolved.into_source_map());
        let page = Arc::new(Url::parse(&page_url).ok());
        report.capture_errors = failures.len();

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_writes.max(1)));
        let mut tasks = JoinSet::new();

        for file in files {
            let body = match archive.remove(&file.url) {
                Some(ResourceEntry::Success { body, .. }) => body,
                _ => continue,
            };
            let path = archive_dir.join(&file.relative_path);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            debug!(url = %file.url, path = %file.relative_path, "archiving resource");
            tasks.spawn(async move {
                let result = write_bounded(&semaphore, &cancel, &path, body).await;
                Outcome::Resource {
                    url: file.url,
                    result,
                }
            });
        }

        let mut story_names = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let file_name = snapshot_file_name(&title, &snapshot.name);
            if !self.claim(&file_name).await {
                warn!(snapshot = %snapshot.name, file = %file_name, "snapshot name collides with one already written in this run");
                report.write_errors.insert(
                    snapshot_key(&snapshot.name),
                    format!("{file_name} was already written in this run"),
                );
                continue;
            }
            story_names.push(snapshot.name.clone());

            let path = archive_dir.join(&file_name);
            let source_map = Arc::clone(&source_map);
            let page = Arc::clone(&page);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let rewritten = rewrite(&snapshot.dom, &source_map, (*page).as_ref());
                let result = match rewritten.to_vec() {
                    Ok(bytes) => write_bounded(&semaphore, &cancel, &path, bytes).await,
                    Err(err) => Err(err),
                };
                Outcome::Snapshot {
                    name: snapshot.name,
                    result,
                }
            });
        }

        let mut panicked = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Resource { result: Ok(()), .. }) => report.resources_written += 1,
                Ok(Outcome::Snapshot { result: Ok(()), .. }) => report.snapshots_written += 1,
                Ok(Outcome::Resource {
                    url,
                    result: Err(err),
                }) => {
                    warn!(%url, error = %err, "failed to write resource");
                    report.write_errors.insert(url, err.to_string());
                }
                Ok(Outcome::Snapshot {
                    name,
                    result: Err(err),
                }) => {
                    warn!(snapshot = %name, error = %err, "failed to write snapshot");
                    report.write_errors.insert(snapshot_key(&name), err.to_string());
                }
                Err(err) => {
                    panicked += 1;
                    warn!(error = %err, "archive write task failed");
                    report
                        .write_errors
                        .insert(format!("task:{panicked}"), err.to_string());
                }
            }
        }
        report.cancelled = self.cancel.is_cancelled();

        let stories_name = stories_file_name(&title);
        if self.claim(&stories_name).await {
            let path = run_dir.join(&stories_name);
            info!("Writing {}", path.display());
            let stories = StoriesFile::new(&title, story_names.iter().map(String::as_str), &options);
            match write_json(&path, &stories).await {
                Ok(()) => report.manifest = Some(path),
                Err(err) => {
                    warn!(error = %err, "failed to write stories file");
                    report.write_errors.insert(stories_key(&title), err.to_string());
                }
            }
        } else {
            warn!(file = %stories_name, "stories file already written in this run");
            report.write_errors.insert(
                stories_key(&title),
                format!("{stories_name} was already written in this run"),
            );
        }

        self.write_error_report(&archive_dir, failures, &mut report)
            .await;

        if report.cancelled {
            warn!("write cancelled; leaving latest pointer untouched");
        } else {
            let root = self.output_root.clone();
            let run_id = self.run_id.clone();
            let swapped = tokio::task::spawn_blocking(move || publish_latest(&root, &run_id))
                .await
                .map_err(|e| ArchiveError::Unknown(e.to_string()))
                .and_then(|swapped| swapped);
            if let Err(err) = swapped {
                warn!(error = %err, "run written but latest pointer not updated");
                report.pointer_error = Some(err.to_string());
            }
        }

        info!(
            resources = report.resources_written,
            snapshots = report.snapshots_written,
            capture_errors = report.capture_errors,
            write_errors = report.write_errors.len(),
            "Finished writing \"{title}\""
        );
        Ok(report)
    }

    async fn ensure_dirs(&self, run_dir: &Path, archive_dir: &Path) -> Result<()> {
        for dir in [self.output_root.as_path(), run_dir, archive_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ArchiveError::output_root(dir, e))?;
        }
        Ok(())
    }

    async fn claim(&self, file_name: &str) -> bool {
        self.state.lock().await.claimed.insert(file_name.to_string())
    }

    /// Merge this result's failures into the run's `errors.json`. The state
    /// lock is held across the write so concurrent results cannot publish a
    /// stale report.
    async fn write_error_report(
        &self,
        archive_dir: &Path,
        failures: std::collections::BTreeMap<String, String>,
        report: &mut WriteReport,
    ) {
        let mut state = self.state.lock().await;
        state.errors.errors.extend(failures);
        state.errors.write_errors.extend(
            report
                .write_errors
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if state.errors.is_empty() {
            return;
        }

        let total = state.errors.errors.len() + state.errors.write_errors.len();
        info!("Encountered {total} errors archiving resources, writing to '{ERRORS_FILE}'");
        if let Err(err) = write_json(&archive_dir.join(ERRORS_FILE), &state.errors).await {
            warn!(error = %err, "failed to write error report");
            report
                .write_errors
                .insert(ERRORS_FILE.to_string(), err.to_string());
        }
    }
}

async fn write_bounded(
    semaphore: &Semaphore,
    cancel: &CancellationToken,
    path: &Path,
    bytes: Vec<u8>,
) -> Result<()> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ArchiveError::Cancelled),
        permit = semaphore.acquire() => permit.map_err(|_| ArchiveError::Cancelled)?,
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ArchiveError::Cancelled),
        written = write_file(path, &bytes) => written,
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_file(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DomSnapshot, NamedSnapshot};
    use serde_json::json;
    use tempfile::tempdir;

    fn result(title: &str, snapshot_names: &[&str]) -> TestResult {
        let mut result = TestResult::new(title, "http://x/");
        result
            .archive
            .insert("http://x/a.png".into(), ResourceEntry::success(200, b"png".to_vec()));
        result.snapshots = snapshot_names
            .iter()
            .map(|name| NamedSnapshot::new(*name, DomSnapshot::new(json!({ "attributes": { "src": "/a.png" } }))))
            .collect();
        result
    }

    #[tokio::test]
    async fn colliding_snapshot_names_are_reported_not_overwritten() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());

        let report = writer
            .write(result("Home", &["Snapshot #1", "snapshot 1"]))
            .await
            .unwrap();

        assert_eq!(report.snapshots_written, 1);
        assert!(report.write_errors.contains_key("snapshot:snapshot 1"));

        let stories: StoriesFile = serde_json::from_slice(
            &std::fs::read(writer.run_dir().join("home.stories.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(stories.stories.len(), 1);
        assert_eq!(stories.stories[0].name, "Snapshot #1");
    }

    #[tokio::test]
    async fn second_result_with_same_title_is_reported() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());

        writer.write(result("Home", &["Snapshot #1"])).await.unwrap();
        let second = writer.write(result("home", &["Snapshot #1"])).await.unwrap();

        assert_eq!(second.snapshots_written, 0);
        assert!(second.write_errors.contains_key("stories:home"));
        assert!(second.write_errors.contains_key("snapshot:Snapshot #1"));

        let errors: ErrorReport = serde_json::from_slice(
            &std::fs::read(writer.archive_dir().join(ERRORS_FILE)).unwrap(),
        )
        .unwrap();
        assert!(errors.errors.is_empty());
        assert!(errors.write_errors.contains_key("stories:home"));
    }

    #[tokio::test]
    async fn cancelled_write_leaves_pointer_alone() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        writer.cancellation_token().cancel();

        let report = writer.write(result("Home", &["Snapshot #1"])).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.resources_written, 0);
        assert_eq!(
            report.write_errors.get("http://x/a.png").map(String::as_str),
            Some("Write cancelled before completion")
        );
        assert!(report.manifest.is_some());
        assert!(std::fs::symlink_metadata(root.path().join("latest")).is_err());
    }

    #[tokio::test]
    async fn unwritable_output_root_is_fatal() {
        let root = tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let writer = ArchiveWriter::with_run_id(blocker.join("nested"), "run", WriterOptions::default());
        let err = writer.write(result("Home", &[])).await.unwrap_err();
        assert!(matches!(err, ArchiveError::OutputRoot { .. }));
    }

    #[tokio::test]
    async fn resource_write_failure_is_isolated() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let mut input = result("Home", &["Snapshot #1"]);
        input
            .archive
            .insert("http://x/b.css".into(), ResourceEntry::success(200, b"y".to_vec()));
        // A directory already sits where `a.png` has to be written.
        std::fs::create_dir_all(writer.archive_dir().join("a.png")).unwrap();

        let report = writer.write(input).await.unwrap();

        assert_eq!(report.resources_written, 1);
        assert_eq!(report.write_errors.len(), 1);
        assert!(report.write_errors.contains_key("http://x/a.png"));
        assert_eq!(report.snapshots_written, 1);
        assert!(report.manifest.is_some());
        assert_eq!(std::fs::read(writer.archive_dir().join("b.css")).unwrap(), b"y");

        let errors: ErrorReport = serde_json::from_slice(
            &std::fs::read(writer.archive_dir().join(ERRORS_FILE)).unwrap(),
        )
        .unwrap();
        assert!(errors.write_errors.contains_key("http://x/a.png"));
    }

    #[tokio::test]
    async fn resource_named_like_the_error_report_keeps_its_body() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let mut input = result("Home", &["Snapshot #1"]);
        input.archive.insert(
            "http://x/errors.json".into(),
            ResourceEntry::success(200, br#"{"site":1}"#.to_vec()),
        );
        input
            .archive
            .insert("http://x/b.png".into(), ResourceEntry::failure("timeout"));

        let report = writer.write(input).await.unwrap();
        assert_eq!(report.resources_written, 2);

        let errors: ErrorReport = serde_json::from_slice(
            &std::fs::read(writer.archive_dir().join(ERRORS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(errors.errors.get("http://x/b.png").map(String::as_str), Some("timeout"));

        let site_copies: Vec<_> = std::fs::read_dir(writer.archive_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| std::fs::read(path).ok().as_deref() == Some(&br#"{"site":1}"#[..]))
            .collect();
        assert_eq!(site_copies.len(), 1);
        assert_ne!(site_copies[0].file_name().unwrap(), ERRORS_FILE);
    }

    #[tokio::test]
    async fn clean_result_with_an_errors_json_resource_stays_clean() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let mut input = result("Home", &["Snapshot #1"]);
        input.archive.insert(
            "http://x/errors.json".into(),
            ResourceEntry::success(200, b"{}".to_vec()),
        );

        let report = writer.write(input).await.unwrap();

        assert!(report.is_clean());
        assert!(!writer.archive_dir().join(ERRORS_FILE).exists());
    }

    #[tokio::test]
    async fn results_in_one_run_never_overwrite_each_others_resources() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let logo = |page: &str, body: &[u8]| {
            let mut result = TestResult::new(page, format!("http://{page}/"));
            result.archive.insert(
                format!("http://{page}/logo.png"),
                ResourceEntry::success(200, body.to_vec()),
            );
            result.snapshots = vec![NamedSnapshot::new(
                "Snapshot #1",
                DomSnapshot::new(json!({ "attributes": { "src": "/logo.png" } })),
            )];
            result
        };

        let a = writer.write(logo("a.test", b"AAA")).await.unwrap();
        let b = writer.write(logo("b.test", b"BBB")).await.unwrap();
        assert!(a.is_clean() && b.is_clean());

        let archive_dir = writer.archive_dir();
        assert_eq!(std::fs::read(archive_dir.join("logo.png")).unwrap(), b"AAA");
        let b_snapshot: serde_json::Value = serde_json::from_slice(
            &std::fs::read(archive_dir.join("b-test-snapshot-1.snapshot.json")).unwrap(),
        )
        .unwrap();
        let b_path = b_snapshot["attributes"]["src"].as_str().unwrap().to_string();
        assert_ne!(b_path, "logo.png");
        assert_eq!(std::fs::read(archive_dir.join(&b_path)).unwrap(), b"BBB");
    }

    #[tokio::test]
    async fn file_and_directory_with_the_same_path_are_both_written() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let mut input = result("Home", &["Snapshot #1"]);
        input
            .archive
            .insert("http://x/dir".into(), ResourceEntry::success(200, b"x".to_vec()));
        input
            .archive
            .insert("http://x/dir/b.css".into(), ResourceEntry::success(200, b"y".to_vec()));

        let report = writer.write(input).await.unwrap();

        assert!(report.is_clean(), "{:?}", report.write_errors);
        assert_eq!(report.resources_written, 3);
        assert_eq!(std::fs::read(writer.archive_dir().join("dir/b.css")).unwrap(), b"y");
    }

    #[tokio::test]
    async fn page_relative_references_in_a_subdirectory_are_rewritten() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let mut input = TestResult::new("Docs", "http://x/docs/page.html");
        input.archive.insert(
            "http://x/docs/img/Logo Big.PNG".into(),
            ResourceEntry::success(200, b"png".to_vec()),
        );
        input.snapshots = vec![NamedSnapshot::new(
            "Snapshot #1",
            DomSnapshot::new(json!({ "childNodes": [
                { "attributes": { "src": "img/Logo Big.PNG" } },
                { "attributes": { "src": "//x/docs/img/Logo%20Big.PNG" } }
            ] })),
        )];

        writer.write(input).await.unwrap();

        let archive_dir = writer.archive_dir();
        assert!(archive_dir.join("docs/img/logo-big.png").exists());
        let snapshot: serde_json::Value = serde_json::from_slice(
            &std::fs::read(archive_dir.join("docs-snapshot-1.snapshot.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot["childNodes"][0]["attributes"]["src"], "docs/img/logo-big.png");
        assert_eq!(snapshot["childNodes"][1]["attributes"]["src"], "docs/img/logo-big.png");
    }

    #[tokio::test]
    async fn inline_urls_are_skipped_quietly() {
        let root = tempdir().unwrap();
        let writer = ArchiveWriter::with_run_id(root.path(), "run", WriterOptions::default());
        let mut input = result("Home", &["Snapshot #1"]);
        input.archive.insert(
            "data:image/png;base64,AAAA".into(),
            ResourceEntry::success(200, b"x".to_vec()),
        );
        input.archive.insert(
            "blob:http://x/5f1c".into(),
            ResourceEntry::success(200, b"x".to_vec()),
        );

        let report = writer.write(input).await.unwrap();

        assert!(report.is_clean(), "{:?}", report.write_errors);
        assert_eq!(report.resources_written, 1);
        assert!(!writer.archive_dir().join(ERRORS_FILE).exists());
    }
}
