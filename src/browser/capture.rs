//! Drives one Playwright page visit and collects what it loaded.

use futures::channel::mpsc as event_channel;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use super::playwright::{
    ensure_node_available, ensure_playwright_available, map_playwright_error, map_spawn_error,
    CAPTURE_SCRIPT,
};
use super::protocol::{parse_line, Control, Parsed};
use crate::types::{
    DomSnapshot, NamedSnapshot, NetworkEvent, ResourceArchive, StoryOptions, TestResult, Viewport,
};
use crate::watcher::ResourceWatcher;
use crate::{ArchiveError, Result};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest wait for the network to settle before snapshotting anyway.
pub const DEFAULT_NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the entire Playwright process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Time without network activity after which the page counts as settled.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// How long the driver gets to exit after being told to close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct CaptureOptions {
    /// The Node.js command to use (default: "node").
    pub node_command: String,
    pub viewport: Viewport,
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub network_idle_timeout: Duration,
    pub process_timeout: Duration,
    pub quiet_period: Duration,
    /// Optional progress callback for human-readable status lines.
    pub progress: Option<ProgressCallback>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            viewport: Viewport::default(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            quiet_period: DEFAULT_QUIET_PERIOD,
            progress: None,
        }
    }
}

/// Everything one page visit produced.
#[derive(Debug, Clone)]
pub struct PageCapture {
    /// Page URL at snapshot time, after redirects.
    pub page_url: String,
    pub snapshots: Vec<NamedSnapshot>,
    pub archive: ResourceArchive,
}

impl PageCapture {
    pub fn into_test_result(self, title: impl Into<String>, options: StoryOptions) -> TestResult {
        TestResult {
            title: title.into(),
            page_url: self.page_url,
            snapshots: self.snapshots,
            archive: self.archive,
            options,
        }
    }
}

/// Captures pages by running [`CAPTURE_SCRIPT`] under Node.js.
#[derive(Clone)]
pub struct PlaywrightCapture {
    options: CaptureOptions,
}

struct Session {
    page_url: String,
    dom: DomSnapshot,
}

impl PlaywrightCapture {
    pub fn new(options: CaptureOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Visit `url`, wait for the network to settle, take one DOM snapshot
    /// and return it with every resource the page loaded.
    pub async fn capture(&self, url: &str) -> Result<PageCapture> {
        let target = Url::parse(url)?;
        let options = &self.options;
        self.progress(&format!(
            "Launching headless browser for {} ({}x{}, nav {}s)…",
            target,
            options.viewport.width,
            options.viewport.height,
            options.navigation_timeout.as_secs()
        ));
        ensure_node_available(&options.node_command).await?;
        ensure_playwright_available(&options.node_command).await?;

        let mut cmd = Command::new(&options.node_command);
        cmd.arg("-e")
            .arg(CAPTURE_SCRIPT)
            .arg(target.as_str())
            .arg(options.viewport.width.to_string())
            .arg(options.viewport.height.to_string())
            .arg(options.navigation_timeout.as_millis().to_string())
            .arg(if options.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, &options.node_command))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ArchiveError::capture("Capture driver stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ArchiveError::capture("Capture driver stdout unavailable"))?;
        let stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr_pipe {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let (event_tx, event_rx) = event_channel::unbounded();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let mut watcher = ResourceWatcher::new();
        watcher.start(event_rx);
        let reader = tokio::spawn(read_driver_output(stdout, event_tx, control_tx));

        let session = match timeout(
            options.process_timeout,
            self.drive(&watcher, stdin, control_rx),
        )
        .await
        {
            Ok(session) => session,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                return Err(ArchiveError::capture(format!(
                    "Playwright timed out after {:?}",
                    options.process_timeout
                )));
            }
        };

        let status = wait_for_exit(&mut child).await?;
        let _ = reader.await;
        watcher.await_finished().await;
        let stderr = stderr_task.await.unwrap_or_default();

        let session = match session {
            Some(session) if status.success() => session,
            _ => {
                let stderr = String::from_utf8_lossy(&stderr);
                if status.success() {
                    return Err(ArchiveError::capture(format!(
                        "Capture driver exited before finishing: {}",
                        stderr.trim()
                    )));
                }
                return Err(map_playwright_error(status.to_string(), &stderr));
            }
        };

        let archive = watcher.archive();
        info!(
            url = %session.page_url,
            resources = archive.len(),
            "captured page"
        );
        self.progress(&format!("Captured {} resources", archive.len()));
        Ok(PageCapture {
            page_url: session.page_url,
            snapshots: NamedSnapshot::numbered([session.dom]),
            archive,
        })
    }

    /// Run the command protocol. `None` means the driver went away early;
    /// its exit status and stderr explain why.
    async fn drive(
        &self,
        watcher: &ResourceWatcher,
        mut stdin: ChildStdin,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) -> Option<Session> {
        let page_url = match control.recv().await? {
            Control::Ready(url) => url,
            other => {
                debug!(?other, "unexpected control message before ready");
                return None;
            }
        };

        self.progress("Page loaded; waiting for network to settle…");
        let settle = watcher.await_idle(self.options.quiet_period);
        if timeout(self.options.network_idle_timeout, settle).await.is_err() {
            warn!(
                in_flight = watcher.activity().in_flight,
                "network did not settle within {:?}; snapshotting anyway",
                self.options.network_idle_timeout
            );
        }

        send(&mut stdin, "snapshot").await?;
        let dom = loop {
            match control.recv().await? {
                Control::Snapshot(dom) => break dom,
                other => debug!(?other, "ignoring control message"),
            }
        };

        send(&mut stdin, "close").await?;
        while let Some(message) = control.recv().await {
            if matches!(message, Control::Done) {
                break;
            }
        }
        Some(Session { page_url, dom })
    }

    fn progress(&self, message: &str) {
        if let Some(cb) = &self.options.progress {
            cb(message);
        }
    }
}

async fn send(stdin: &mut ChildStdin, command: &str) -> Option<()> {
    let line = format!("{command}\n");
    if let Err(err) = stdin.write_all(line.as_bytes()).await {
        debug!(error = %err, command, "capture driver closed its input");
        return None;
    }
    stdin.flush().await.ok()
}

async fn wait_for_exit(child: &mut Child) -> Result<std::process::ExitStatus> {
    match timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            let _ = child.kill().await;
            Ok(child.wait().await?)
        }
    }
}

/// Split driver stdout into network events for the watcher and control
/// messages for the session.
async fn read_driver_output(
    stdout: ChildStdout,
    network: event_channel::UnboundedSender<NetworkEvent>,
    control: mpsc::UnboundedSender<Control>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Some(Parsed::Network(event)) => {
                    let _ = network.unbounded_send(event);
                }
                Some(Parsed::Control(message)) => {
                    let _ = control.send(message);
                }
                None => debug!(line = %line, "ignoring driver output"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed reading capture driver output");
                break;
            }
        }
    }
}
