//! Scriptable in-memory [`IndexerApi`] shared by the async integration tests.
//!
//! Every call is recorded before its scripted delay elapses, so a test can
//! assert on what was sent even while the reply is still pending. Replies
//! are `Ok(value)` or `Err((status, detail))`; status `0` stands for a
//! network failure.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexer_console::client::IndexerApi;
use indexer_console::error::ApiError;
use indexer_console_core::jobs::{JobListFilter, StartJobRequest};
use indexer_console_core::models::StartedJob;
use indexer_console_core::query::SearchRequest;
use indexer_console_core::{
    IndexerProcess, IndexerStatus, IndexerType, LogEntry, LogsResponse, SearchResultPage,
};

pub type Reply<T> = Result<T, (u16, &'static str)>;

type Handler<A, T> = Mutex<Box<dyn FnMut(&A) -> (Duration, Reply<T>) + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListJobs(JobListFilter),
    GetJob(u64),
    StartJob(StartJobRequest),
    StopJob(u64),
    TailLogs(u64, Option<String>),
    Search(SearchRequest),
}

pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    list_jobs: Handler<JobListFilter, Vec<IndexerProcess>>,
    get_job: Handler<u64, IndexerProcess>,
    start_job: Handler<StartJobRequest, StartedJob>,
    stop_job: Handler<u64, ()>,
    tail_logs: Handler<(u64, Option<String>), LogsResponse>,
    search: Handler<SearchRequest, SearchResultPage>,
}

fn handler<A, T>(
    f: impl FnMut(&A) -> (Duration, Reply<T>) + Send + 'static,
) -> Handler<A, T> {
    Mutex::new(Box::new(f))
}

impl FakeApi {
    /// Defaults: no jobs, unknown job ids are 404, empty logs, started jobs
    /// get id 1, stops succeed, and searches report 100 rows.
    pub fn new() -> Arc<FakeApi> {
        Arc::new(FakeApi {
            calls: Mutex::new(Vec::new()),
            list_jobs: handler(|_| (Duration::ZERO, Ok(vec![]))),
            get_job: handler(|_| (Duration::ZERO, Err((404, "")))),
            start_job: handler(|_| (Duration::ZERO, Ok(StartedJob { id: 1 }))),
            stop_job: handler(|_| (Duration::ZERO, Ok(()))),
            tail_logs: handler(|_| (Duration::ZERO, Ok(LogsResponse::default()))),
            search: handler(|req: &SearchRequest| (Duration::ZERO, Ok(page_for(req, 100)))),
        })
    }

    pub fn on_list_jobs(
        &self,
        f: impl FnMut(&JobListFilter) -> (Duration, Reply<Vec<IndexerProcess>>) + Send + 'static,
    ) {
        *self.list_jobs.lock().unwrap() = Box::new(f);
    }

    pub fn on_get_job(
        &self,
        f: impl FnMut(&u64) -> (Duration, Reply<IndexerProcess>) + Send + 'static,
    ) {
        *self.get_job.lock().unwrap() = Box::new(f);
    }

    pub fn on_start_job(
        &self,
        f: impl FnMut(&StartJobRequest) -> (Duration, Reply<StartedJob>) + Send + 'static,
    ) {
        *self.start_job.lock().unwrap() = Box::new(f);
    }

    pub fn on_stop_job(&self, f: impl FnMut(&u64) -> (Duration, Reply<()>) + Send + 'static) {
        *self.stop_job.lock().unwrap() = Box::new(f);
    }

    pub fn on_tail_logs(
        &self,
        f: impl FnMut(&(u64, Option<String>)) -> (Duration, Reply<LogsResponse>) + Send + 'static,
    ) {
        *self.tail_logs.lock().unwrap() = Box::new(f);
    }

    pub fn on_search(
        &self,
        f: impl FnMut(&SearchRequest) -> (Duration, Reply<SearchResultPage>) + Send + 'static,
    ) {
        *self.search.lock().unwrap() = Box::new(f);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Search(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_search(&self) -> SearchRequest {
        self.searches().pop().expect("no search was sent")
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

async fn respond<A, T>(handler: &Handler<A, T>, arg: &A) -> Result<T, ApiError> {
    let (delay, reply) = {
        let mut f = handler.lock().unwrap();
        (f)(arg)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    reply.map_err(|(status, detail)| match (status, detail) {
        (0, msg) => ApiError::Network(msg.to_string()),
        (s, "") => ApiError::from_status(s, None),
        (s, d) => ApiError::from_status(s, Some(d.to_string())),
    })
}

#[async_trait]
impl IndexerApi for FakeApi {
    async fn list_jobs(&self, filter: &JobListFilter) -> Result<Vec<IndexerProcess>, ApiError> {
        self.record(Call::ListJobs(*filter));
        respond(&self.list_jobs, filter).await
    }

    async fn get_job(&self, id: u64) -> Result<IndexerProcess, ApiError> {
        self.record(Call::GetJob(id));
        respond(&self.get_job, &id).await
    }

    async fn start_job(&self, request: &StartJobRequest) -> Result<StartedJob, ApiError> {
        self.record(Call::StartJob(request.clone()));
        respond(&self.start_job, request).await
    }

    async fn stop_job(&self, id: u64) -> Result<(), ApiError> {
        self.record(Call::StopJob(id));
        respond(&self.stop_job, &id).await
    }

    async fn tail_logs(&self, id: u64, since: Option<&str>) -> Result<LogsResponse, ApiError> {
        let arg = (id, since.map(str::to_string));
        self.record(Call::TailLogs(arg.0, arg.1.clone()));
        respond(&self.tail_logs, &arg).await
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResultPage, ApiError> {
        self.record(Call::Search(request.clone()));
        respond(&self.search, request).await
    }
}

/// Replays `replies` in order, repeating the last one forever.
pub fn sequence<A, T: Clone>(
    replies: Vec<(Duration, Reply<T>)>,
) -> impl FnMut(&A) -> (Duration, Reply<T>) + Send + 'static
where
    A: 'static,
    T: Send + 'static,
{
    let mut queue: VecDeque<_> = replies.into();
    move |_: &A| {
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("empty reply script")
        }
    }
}

pub fn now<T>(reply: Reply<T>) -> (Duration, Reply<T>) {
    (Duration::ZERO, reply)
}

pub fn after<T>(millis: u64, reply: Reply<T>) -> (Duration, Reply<T>) {
    (Duration::from_millis(millis), reply)
}

pub fn job(id: u64, status: IndexerStatus) -> IndexerProcess {
    IndexerProcess {
        id,
        kind: IndexerType::SyncSince,
        status,
        params: serde_json::json!({ "since": "2024-01-15 10:00:00" }),
        started_at: "2024-01-15T10:00:05".to_string(),
        completed_at: None,
        progress: None,
        error_message: None,
    }
}

pub fn entry(timestamp: &str, message: &str) -> LogEntry {
    LogEntry {
        timestamp: timestamp.to_string(),
        level: "INFO".to_string(),
        message: message.to_string(),
    }
}

/// A result page answering `request` out of `total` rows.
pub fn page_for(request: &SearchRequest, total: u64) -> SearchResultPage {
    let size = u64::from(request.page_size.max(1));
    let paginas = total.div_ceil(size).max(1) as u32;
    SearchResultPage {
        publicaciones: vec![],
        total,
        pagina: request.page,
        paginas,
    }
}
