//! Accumulates network events for one page visit into a [`ResourceArchive`].

use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::types::{NetworkEvent, ResourceArchive};

/// Published after every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    /// Requests started but not yet answered.
    pub in_flight: usize,
    /// Bumped on every event, so waiters notice activity even when the
    /// in-flight count ends where it started.
    pub generation: u64,
    /// The event stream ended or the watcher was stopped.
    pub finished: bool,
}

/// Watches one event stream.
///
/// Responses are stored keyed by URL; a later response for the same URL
/// replaces the earlier one and entries are never removed.
#[derive(Debug)]
pub struct ResourceWatcher {
    archive: Arc<Mutex<ResourceArchive>>,
    activity: Arc<watch::Sender<Activity>>,
    task: Option<JoinHandle<()>>,
}

impl Default for ResourceWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceWatcher {
    pub fn new() -> Self {
        let (activity, _) = watch::channel(Activity::default());
        Self {
            archive: Arc::new(Mutex::new(ResourceArchive::new())),
            activity: Arc::new(activity),
            task: None,
        }
    }

    /// Consume `events` on a background task. Starting again replaces the
    /// previous stream; already recorded entries are kept.
    pub fn start<S>(&mut self, events: S)
    where
        S: Stream<Item = NetworkEvent> + Send + 'static,
    {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.activity.send_modify(|activity| activity.finished = false);

        let archive = Arc::clone(&self.archive);
        let activity = Arc::clone(&self.activity);
        self.task = Some(tokio::spawn(async move {
            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                record(&archive, &activity, event);
            }
            debug!("network event stream ended");
            activity.send_modify(|activity| {
                activity.finished = true;
                activity.generation += 1;
            });
        }));
    }

    /// Stop consuming events. Waiters in [`await_idle`](Self::await_idle)
    /// return immediately.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.activity.send_modify(|activity| activity.finished = true);
    }

    /// Copy of everything captured so far.
    pub fn archive(&self) -> ResourceArchive {
        self.archive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn activity(&self) -> Activity {
        *self.activity.borrow()
    }

    /// Resolve once every event of the stream has been recorded.
    pub async fn await_finished(&self) {
        let mut updates = self.activity.subscribe();
        let _ = updates.wait_for(|activity| activity.finished).await;
    }

    /// Resolve once no request is in flight and no event arrives for a full
    /// `quiet_period`, or once the event stream has ended.
    pub async fn await_idle(&self, quiet_period: Duration) {
        let mut updates = self.activity.subscribe();
        loop {
            let finished = match updates
                .wait_for(|activity| activity.in_flight == 0 || activity.finished)
                .await
            {
                Ok(activity) => activity.finished,
                Err(_) => return,
            };
            if finished {
                return;
            }
            match tokio::time::timeout(quiet_period, updates.changed()).await {
                Err(_) | Ok(Err(_)) => return,
                Ok(Ok(())) => continue,
            }
        }
    }
}

impl Drop for ResourceWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn record(
    archive: &Mutex<ResourceArchive>,
    activity: &watch::Sender<Activity>,
    event: NetworkEvent,
) {
    match event {
        NetworkEvent::Request { url } => {
            trace!(%url, "request started");
            activity.send_modify(|activity| {
                activity.in_flight += 1;
                activity.generation += 1;
            });
        }
        NetworkEvent::Response(response) => {
            let (url, entry) = response.into_entry();
            trace!(%url, failed = entry.is_failure(), "response recorded");
            archive
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(url, entry);
            activity.send_modify(|activity| {
                activity.in_flight = activity.in_flight.saturating_sub(1);
                activity.generation += 1;
            });
        }
    }
}
