//! Cursor-based log buffer for one job.
//!
//! The server decides what counts as new: the buffer sends its cursor as the
//! `since` bound and appends whatever comes back, in arrival order. It never
//! filters, sorts or drops entries itself.

use crate::models::{LogEntry, LogsResponse};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    process_id: u64,
    entries: Vec<LogEntry>,
    cursor: Option<String>,
}

impl LogBuffer {
    /// Empty buffer for `process_id`; the first fetch asks for full history.
    pub fn new(process_id: u64) -> Self {
        Self {
            process_id,
            ..Default::default()
        }
    }

    pub fn process_id(&self) -> u64 {
        self.process_id
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the newest received entry, `None` before the first one.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Merges a fetch result made for `process_id`, returning how many
    /// entries were appended.
    ///
    /// Responses for another process are ignored. An empty batch leaves the
    /// cursor where it was, whatever `last_timestamp` says.
    pub fn apply(&mut self, process_id: u64, response: LogsResponse) -> usize {
        if process_id != self.process_id {
            return 0;
        }
        let LogsResponse {
            logs,
            last_timestamp,
        } = response;
        if logs.is_empty() {
            return 0;
        }
        let next_cursor = last_timestamp
            .filter(|ts| !ts.is_empty())
            .or_else(|| logs.last().map(|e| e.timestamp.clone()));
        let appended = logs.len();
        self.entries.extend(logs);
        if next_cursor.is_some() {
            self.cursor = next_cursor;
        }
        appended
    }
}
