//! Job status poller for the detail view of one job.
//!
//! Phases follow [`StatusPhase`]: `Loading` until the first answer, then
//! `Polling` while the job runs. A terminal status or a 404 ends the task;
//! nothing is fetched for that id afterwards. Each cycle is fetch, await,
//! then wait for the interval, so fetches never overlap.
//!
//! Stopping a job goes through [`JobStatusHandle::stop`]: the caller
//! confirms, the stop request is sent, and on success the poller is woken for
//! an out-of-cycle refresh instead of waiting for its next tick. A failed
//! stop leaves the local snapshot alone; the next poll shows the real state.

use std::sync::Arc;
use std::time::Duration;

use indexer_console_core::jobs::{FetchOutcome, StatusPhase};
use indexer_console_core::IndexerProcess;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::IndexerApi;
use crate::error::{ApiError, PollFailure};

#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusView {
    pub id: u64,
    pub phase: StatusPhase,
    /// Last snapshot received from the server.
    pub process: Option<IndexerProcess>,
    /// A stop request is in flight.
    pub stopping: bool,
    pub last_error: Option<PollFailure>,
    /// Fetch attempts so far, failed ones included.
    pub fetches: u64,
}

impl JobStatusView {
    fn new(id: u64) -> Self {
        Self {
            id,
            phase: StatusPhase::Loading,
            process: None,
            stopping: false,
            last_error: None,
            fetches: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The operator did not confirm; nothing was sent.
    Declined,
    Stopped,
}

pub struct JobStatusPoller {
    api: Arc<dyn IndexerApi>,
    id: u64,
    interval: Duration,
    view_tx: Arc<watch::Sender<JobStatusView>>,
    refresh: Arc<Notify>,
}

impl JobStatusPoller {
    /// Starts polling job `id` every `interval`.
    pub fn start(api: Arc<dyn IndexerApi>, id: u64, interval: Duration) -> JobStatusHandle {
        let (view_tx, view_rx) = watch::channel(JobStatusView::new(id));
        let view_tx = Arc::new(view_tx);
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let poller = JobStatusPoller {
            api: api.clone(),
            id,
            interval,
            view_tx: view_tx.clone(),
            refresh: refresh.clone(),
        };
        let task = tokio::spawn(poller.run(cancel.clone()));

        JobStatusHandle {
            api,
            id,
            view_tx,
            view: view_rx,
            refresh,
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        debug!(job = self.id, "status poller started");
        let mut phase = StatusPhase::Loading;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.api.get_job(self.id) => result,
            };

            phase = self.apply(phase, result);
            if phase.is_final() {
                info!(job = self.id, ?phase, "status polling finished");
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.refresh.notified() => {
                    debug!(job = self.id, "out-of-cycle refresh");
                }
            }
        }
        debug!(job = self.id, "status poller cancelled");
    }

    fn apply(&self, phase: StatusPhase, result: Result<IndexerProcess, ApiError>) -> StatusPhase {
        let (outcome, process, failure) = match result {
            Ok(process) => (FetchOutcome::Snapshot(process.status), Some(process), None),
            Err(ApiError::NotFound) => (FetchOutcome::Missing, None, None),
            Err(e) => {
                if e.is_transient() {
                    info!(job = self.id, "status fetch failed, retrying: {}", e);
                } else {
                    warn!(job = self.id, "status fetch failed: {}", e);
                }
                (FetchOutcome::Failed, None, Some(PollFailure::from(&e)))
            }
        };
        let next = phase.advance(outcome);
        self.view_tx.send_modify(|view| {
            view.phase = next;
            view.fetches += 1;
            if let Some(process) = process {
                view.process = Some(process);
                view.last_error = None;
            }
            if failure.is_some() {
                view.last_error = failure;
            }
        });
        next
    }
}

/// Owner of a running [`JobStatusPoller`]. Dropping it stops polling.
pub struct JobStatusHandle {
    api: Arc<dyn IndexerApi>,
    id: u64,
    view_tx: Arc<watch::Sender<JobStatusView>>,
    view: watch::Receiver<JobStatusView>,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JobStatusHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn view(&self) -> JobStatusView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatusView> {
        self.view.clone()
    }

    /// Asks for a fetch now instead of at the next tick.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Waits until the job is terminal or known to be missing.
    pub async fn finished(&mut self) -> JobStatusView {
        if let Ok(view) = self.view.wait_for(|v| v.phase.is_final()).await {
            return (*view).clone();
        }
        self.view.borrow().clone()
    }

    /// Stops the job after `confirm` agrees.
    ///
    /// On failure the server's error is returned and the view is left as it
    /// was apart from the busy flag.
    pub async fn stop<F>(&self, confirm: F) -> Result<StopOutcome, ApiError>
    where
        F: FnOnce(&JobStatusView) -> bool,
    {
        if !confirm(&self.view.borrow()) {
            return Ok(StopOutcome::Declined);
        }
        self.view_tx.send_modify(|view| view.stopping = true);
        let result = self.api.stop_job(self.id).await;
        self.view_tx.send_modify(|view| view.stopping = false);

        match result {
            Ok(()) => {
                info!(job = self.id, "stop requested");
                self.refresh();
                Ok(StopOutcome::Stopped)
            }
            Err(e) => {
                warn!(job = self.id, "stop failed: {}", e);
                Err(e)
            }
        }
    }

    /// Stops polling and waits for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for JobStatusHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
