//! Job list poller.
//!
//! Fetches the filtered job collection every interval, whatever the jobs'
//! states. A filter change takes effect at once: an in-flight fetch for the
//! old filter is abandoned (its future dropped), so a slow response for a
//! previous filter can never land in the view.

use std::sync::Arc;
use std::time::Duration;

use indexer_console_core::jobs::JobListFilter;
use indexer_console_core::IndexerProcess;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::IndexerApi;
use crate::error::{ApiError, PollFailure};

#[derive(Debug, Clone, PartialEq)]
pub struct JobListView {
    pub filter: JobListFilter,
    /// `None` until the first answer for `filter`. An empty list is a
    /// normal result.
    pub jobs: Option<Vec<IndexerProcess>>,
    pub last_error: Option<PollFailure>,
    pub fetches: u64,
}

pub struct JobListPoller {
    api: Arc<dyn IndexerApi>,
    interval: Duration,
    filter_rx: watch::Receiver<JobListFilter>,
    view_tx: watch::Sender<JobListView>,
    refresh: Arc<Notify>,
}

/// What ended the wait for a fetch.
enum FetchWake {
    Cancelled,
    FilterChanged,
    Fetched(Result<Vec<IndexerProcess>, ApiError>),
}

/// What ended the wait between fetches.
enum IdleWake {
    Cancelled,
    FilterChanged,
    Tick,
}

impl JobListPoller {
    pub fn start(
        api: Arc<dyn IndexerApi>,
        filter: JobListFilter,
        interval: Duration,
    ) -> JobListHandle {
        let (filter_tx, filter_rx) = watch::channel(filter);
        let (view_tx, view_rx) = watch::channel(JobListView {
            filter,
            jobs: None,
            last_error: None,
            fetches: 0,
        });
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let poller = JobListPoller {
            api,
            interval,
            filter_rx,
            view_tx,
            refresh: refresh.clone(),
        };
        let task = tokio::spawn(poller.run(cancel.clone()));

        JobListHandle {
            filter_tx,
            view: view_rx,
            refresh,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self, cancel: CancellationToken) {
        debug!("job list poller started");
        loop {
            let filter = *self.filter_rx.borrow_and_update();

            let wake = tokio::select! {
                _ = cancel.cancelled() => FetchWake::Cancelled,
                changed = self.filter_rx.changed() => match changed {
                    Ok(()) => FetchWake::FilterChanged,
                    Err(_) => FetchWake::Cancelled,
                },
                result = self.api.list_jobs(&filter) => FetchWake::Fetched(result),
            };
            match wake {
                FetchWake::Cancelled => break,
                FetchWake::FilterChanged => {
                    debug!("filter changed mid-fetch, restarting");
                    self.reset_for_filter();
                    continue;
                }
                FetchWake::Fetched(result) => self.apply(result),
            }

            let wake = tokio::select! {
                _ = cancel.cancelled() => IdleWake::Cancelled,
                changed = self.filter_rx.changed() => match changed {
                    Ok(()) => IdleWake::FilterChanged,
                    Err(_) => IdleWake::Cancelled,
                },
                _ = tokio::time::sleep(self.interval) => IdleWake::Tick,
                _ = self.refresh.notified() => IdleWake::Tick,
            };
            match wake {
                IdleWake::Cancelled => break,
                IdleWake::FilterChanged => self.reset_for_filter(),
                IdleWake::Tick => {}
            }
        }
        debug!("job list poller stopped");
    }

    fn reset_for_filter(&mut self) {
        let filter = *self.filter_rx.borrow();
        self.view_tx.send_modify(|view| {
            view.filter = filter;
            view.jobs = None;
            view.last_error = None;
        });
    }

    fn apply(&self, result: Result<Vec<IndexerProcess>, ApiError>) {
        self.view_tx.send_modify(|view| {
            view.fetches += 1;
            match result {
                Ok(jobs) => {
                    debug!(count = jobs.len(), "job list refreshed");
                    view.jobs = Some(jobs);
                    view.last_error = None;
                }
                Err(e) => {
                    if e.is_transient() {
                        info!("job list fetch failed, retrying: {}", e);
                    } else {
                        warn!("job list fetch failed: {}", e);
                    }
                    view.last_error = Some(PollFailure::from(&e));
                }
            }
        });
    }
}

/// Owner of a running [`JobListPoller`]. Dropping it stops polling.
pub struct JobListHandle {
    filter_tx: watch::Sender<JobListFilter>,
    view: watch::Receiver<JobListView>,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JobListHandle {
    /// Switches the filter; the list is refetched immediately.
    pub fn set_filter(&self, filter: JobListFilter) {
        self.filter_tx.send_replace(filter);
    }

    pub fn filter(&self) -> JobListFilter {
        *self.filter_tx.borrow()
    }

    pub fn view(&self) -> JobListView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobListView> {
        self.view.clone()
    }

    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for JobListHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
