//! Job, progress and log rendering for `ixc`.
//!
//! Watch modes emit one event per poll. Human output is meant for a
//! terminal; JSON output is one object per line so scripts can follow a job
//! with `ixc jobs show ID --watch --json | jq`. Both go to **stdout**;
//! diagnostics stay on stderr through `tracing`.

use std::io::Write;

use indexer_console_core::models::Tally;
use indexer_console_core::{IndexerProcess, LogEntry, ProgressSnapshot, ProgressStage};

/// Something a watch loop wants shown.
#[derive(Clone, Copy, Debug)]
pub enum ConsoleEvent<'a> {
    Job(&'a IndexerProcess),
    JobList(&'a [IndexerProcess]),
    Logs {
        process_id: u64,
        entries: &'a [LogEntry],
    },
    NotFound(u64),
}

/// Renders [`ConsoleEvent`]s. Implementations write to stdout.
pub trait ConsoleReporter: Send + Sync {
    fn report(&self, event: ConsoleEvent<'_>);
}

/// Human-friendly output: "#12  sync-since  running  1,234 / 5,000 (25%)".
pub struct HumanReport;

impl ConsoleReporter for HumanReport {
    fn report(&self, event: ConsoleEvent<'_>) {
        let text = match event {
            ConsoleEvent::Job(job) => format_job_detail(job),
            ConsoleEvent::JobList([]) => "No jobs.\n".to_string(),
            ConsoleEvent::JobList(jobs) => {
                let mut out = String::new();
                for job in jobs {
                    out.push_str(&format_job_line(job));
                    out.push('\n');
                }
                out
            }
            ConsoleEvent::Logs { entries, .. } => {
                let mut out = String::new();
                for entry in entries {
                    out.push_str(&format_log_entry(entry));
                    out.push('\n');
                }
                out
            }
            ConsoleEvent::NotFound(id) => format!("Job #{} not found.\n", id),
        };
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Machine-readable output: one JSON object per line.
pub struct JsonReport;

impl ConsoleReporter for JsonReport {
    fn report(&self, event: ConsoleEvent<'_>) {
        let obj = match event {
            ConsoleEvent::Job(job) => serde_json::json!({
                "event": "job",
                "job": job,
                "percent": job.progress.as_ref().and_then(ProgressSnapshot::percent),
            }),
            ConsoleEvent::JobList(jobs) => serde_json::json!({
                "event": "jobs",
                "jobs": jobs,
            }),
            ConsoleEvent::Logs {
                process_id,
                entries,
            } => serde_json::json!({
                "event": "logs",
                "process_id": process_id,
                "logs": entries,
            }),
            ConsoleEvent::NotFound(id) => serde_json::json!({
                "event": "not_found",
                "process_id": id,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", line);
            let _ = stdout.flush();
        }
    }
}

/// Output mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }

    pub fn reporter(&self) -> Box<dyn ConsoleReporter> {
        match self {
            OutputMode::Human => Box::new(HumanReport),
            OutputMode::Json => Box::new(JsonReport),
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

fn format_tally(tally: Tally) -> String {
    format!(
        "{} indexed, {} failed",
        format_number(tally.indexed),
        format_number(tally.failed)
    )
}

/// One-line progress summary, e.g. `1,234 / 5,000 (25%), 1,200 indexed, 34 failed`.
pub fn format_progress(progress: &ProgressSnapshot) -> String {
    let mut parts = Vec::new();
    match progress.stage {
        ProgressStage::Bounded {
            current,
            total,
            tally,
        } => {
            let pct = progress.percent().unwrap_or(0.0);
            parts.push(format!(
                "{} / {} ({:.0}%)",
                format_number(current),
                format_number(total),
                pct
            ));
            if let Some(tally) = tally {
                parts.push(format_tally(tally));
            }
        }
        ProgressStage::Counted(tally) => parts.push(format_tally(tally)),
        ProgressStage::Indeterminate => {}
    }
    if let Some(message) = &progress.message {
        parts.push(message.clone());
    }
    if parts.is_empty() {
        "in progress".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn format_job_line(job: &IndexerProcess) -> String {
    let progress = job
        .progress
        .as_ref()
        .map(format_progress)
        .unwrap_or_default();
    format!(
        "#{:<6} {:<28} {:<10} {:<20} {}",
        job.id,
        job.kind.as_str(),
        job.status.as_str(),
        job.started_at,
        progress
    )
    .trim_end()
    .to_string()
}

pub fn format_job_detail(job: &IndexerProcess) -> String {
    let mut out = format!("Job #{}  {} ({})\n", job.id, job.kind.label(), job.kind);
    out.push_str(&format!("  status:    {}\n", job.status));
    out.push_str(&format!("  started:   {}\n", job.started_at));
    if let Some(done) = &job.completed_at {
        out.push_str(&format!("  completed: {}\n", done));
    }
    if let Some(params) = job.params.as_object().filter(|p| !p.is_empty()) {
        for (key, value) in params {
            let value = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            out.push_str(&format!("  {}: {}\n", key, value));
        }
    }
    if let Some(progress) = &job.progress {
        out.push_str(&format!("  progress:  {}\n", format_progress(progress)));
    }
    if let Some(err) = &job.error_message {
        out.push_str(&format!("  error:     {}\n", err));
    }
    out
}

pub fn format_log_entry(entry: &LogEntry) -> String {
    format!("{} [{}] {}", entry.timestamp, entry.level, entry.message)
}
