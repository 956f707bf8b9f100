//! Log tailer.
//!
//! Polls `GET /api/indexers/{id}/logs?since=<cursor>` every interval and
//! merges each batch into a [`LogBuffer`]. The cursor only moves when a
//! batch carries entries. Tailing continues after the job turns terminal;
//! the owner decides when to stop by dropping the handle.
//!
//! [`LogTailHandle::switch_process`] discards the buffer and restarts from
//! full history for another job, abandoning any fetch in flight for the old
//! one.

use std::sync::Arc;
use std::time::Duration;

use indexer_console_core::logs::LogBuffer;
use indexer_console_core::{LogEntry, LogsResponse};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::IndexerApi;
use crate::error::{ApiError, PollFailure};

#[derive(Debug, Clone, PartialEq)]
pub struct LogTailView {
    pub buffer: LogBuffer,
    /// Entries appended by the most recent fetch.
    pub last_batch: usize,
    pub last_error: Option<PollFailure>,
    /// Fetch attempts for the current process, failed ones included.
    pub fetches: u64,
    pub fetching: bool,
}

impl LogTailView {
    fn new(process_id: u64) -> Self {
        Self {
            buffer: LogBuffer::new(process_id),
            last_batch: 0,
            last_error: None,
            fetches: 0,
            fetching: false,
        }
    }

    /// The entries appended by the most recent fetch.
    pub fn latest(&self) -> &[LogEntry] {
        let entries = self.buffer.entries();
        &entries[entries.len() - self.last_batch.min(entries.len())..]
    }
}

pub struct LogTailer {
    api: Arc<dyn IndexerApi>,
    interval: Duration,
    process_rx: watch::Receiver<u64>,
    view_tx: watch::Sender<LogTailView>,
    refresh: Arc<Notify>,
}

enum FetchWake {
    Cancelled,
    Switched,
    Fetched(u64, Result<LogsResponse, ApiError>),
}

enum IdleWake {
    Cancelled,
    Switched,
    Tick,
}

impl LogTailer {
    pub fn start(api: Arc<dyn IndexerApi>, process_id: u64, interval: Duration) -> LogTailHandle {
        let (process_tx, process_rx) = watch::channel(process_id);
        let (view_tx, view_rx) = watch::channel(LogTailView::new(process_id));
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let tailer = LogTailer {
            api,
            interval,
            process_rx,
            view_tx,
            refresh: refresh.clone(),
        };
        let task = tokio::spawn(tailer.run(cancel.clone()));

        LogTailHandle {
            process_tx,
            view: view_rx,
            refresh,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self, cancel: CancellationToken) {
        debug!("log tailer started");
        loop {
            let process_id = *self.process_rx.borrow_and_update();
            let cursor = self.view_tx.borrow().buffer.cursor().map(str::to_string);
            self.view_tx.send_modify(|view| view.fetching = true);

            let wake = tokio::select! {
                _ = cancel.cancelled() => FetchWake::Cancelled,
                changed = self.process_rx.changed() => match changed {
                    Ok(()) => FetchWake::Switched,
                    Err(_) => FetchWake::Cancelled,
                },
                result = self.api.tail_logs(process_id, cursor.as_deref()) => {
                    FetchWake::Fetched(process_id, result)
                }
            };
            match wake {
                FetchWake::Cancelled => break,
                FetchWake::Switched => {
                    self.switch();
                    continue;
                }
                FetchWake::Fetched(process_id, result) => self.apply(process_id, result),
            }

            let wake = tokio::select! {
                _ = cancel.cancelled() => IdleWake::Cancelled,
                changed = self.process_rx.changed() => match changed {
                    Ok(()) => IdleWake::Switched,
                    Err(_) => IdleWake::Cancelled,
                },
                _ = tokio::time::sleep(self.interval) => IdleWake::Tick,
                _ = self.refresh.notified() => IdleWake::Tick,
            };
            match wake {
                IdleWake::Cancelled => break,
                IdleWake::Switched => self.switch(),
                IdleWake::Tick => {}
            }
        }
        self.view_tx.send_modify(|view| view.fetching = false);
        debug!("log tailer stopped");
    }

    fn switch(&mut self) {
        let process_id = *self.process_rx.borrow();
        debug!(process_id, "switching log tail");
        self.view_tx.send_replace(LogTailView::new(process_id));
    }

    fn apply(&self, process_id: u64, result: Result<LogsResponse, ApiError>) {
        self.view_tx.send_modify(|view| {
            view.fetching = false;
            view.fetches += 1;
            match result {
                Ok(response) => {
                    view.last_batch = view.buffer.apply(process_id, response);
                    view.last_error = None;
                    if view.last_batch > 0 {
                        debug!(process_id, appended = view.last_batch, "log batch");
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        info!(process_id, "log fetch failed, retrying: {}", e);
                    } else {
                        warn!(process_id, "log fetch failed: {}", e);
                    }
                    view.last_batch = 0;
                    view.last_error = Some(PollFailure::from(&e));
                }
            }
        });
    }
}

/// Owner of a running [`LogTailer`]. Dropping it stops tailing.
pub struct LogTailHandle {
    process_tx: watch::Sender<u64>,
    view: watch::Receiver<LogTailView>,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LogTailHandle {
    pub fn process_id(&self) -> u64 {
        *self.process_tx.borrow()
    }

    /// Tails another process from the start of its history.
    pub fn switch_process(&self, process_id: u64) {
        self.process_tx.send_replace(process_id);
    }

    pub fn view(&self) -> LogTailView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LogTailView> {
        self.view.clone()
    }

    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Forces one more fetch and waits for it to complete.
    ///
    /// Used for a last drain once the job is terminal.
    pub async fn drain(&mut self) -> LogTailView {
        let (before, in_flight) = {
            let view = self.view.borrow_and_update();
            (view.fetches, view.fetching)
        };
        // A fetch already in flight may have been sent before the last
        // entries were written, so wait for the one after it.
        let target = if in_flight { before + 2 } else { before + 1 };
        self.refresh();
        if let Ok(view) = self.view.wait_for(|v| v.fetches >= target).await {
            return (*view).clone();
        }
        self.view.borrow().clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LogTailHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
