//! Per-test-run watcher registry.

use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::types::ResourceArchive;
use crate::watcher::ResourceWatcher;

/// Owns one [`ResourceWatcher`] per active test run.
///
/// Watchers are created the first time a run is watched and torn down when
/// the run finishes, so runs sharing a process never see each other's
/// traffic.
#[derive(Debug, Default)]
pub struct CaptureSessions {
    watchers: HashMap<String, ResourceWatcher>,
}

impl CaptureSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watcher for `run`, created on first use.
    pub fn watch(&mut self, run: &str) -> &mut ResourceWatcher {
        self.watchers.entry(run.to_string()).or_insert_with(|| {
            debug!(run, "starting capture session");
            ResourceWatcher::new()
        })
    }

    pub fn get(&self, run: &str) -> Option<&ResourceWatcher> {
        self.watchers.get(run)
    }

    pub fn is_active(&self, run: &str) -> bool {
        self.watchers.contains_key(run)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Wait for `run` to go idle, tear its watcher down and return what it
    /// captured. `None` if the run was never watched.
    pub async fn finish(&mut self, run: &str, quiet_period: Duration) -> Option<ResourceArchive> {
        let mut watcher = self.watchers.remove(run)?;
        watcher.await_idle(quiet_period).await;
        watcher.stop();
        let archive = watcher.archive();
        debug!(run, resources = archive.len(), "capture session finished");
        Some(archive)
    }
}
