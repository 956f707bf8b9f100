//! One-shot job actions and the `ixc jobs` / `ixc logs` commands.
//!
//! [`start_job`] surfaces failures to the caller right away and leaves
//! nothing changed locally. The `run_*` functions are the CLI
//! entry points; watch modes drive the pollers and print through a
//! [`ConsoleReporter`](crate::progress::ConsoleReporter) until the job is
//! done or the operator presses Ctrl-C.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Result};
use indexer_console_core::jobs::{JobListFilter, StartJobForm, StatusPhase};
use indexer_console_core::models::StartedJob;
use tracing::info;

use crate::client::IndexerApi;
use crate::config::PollingConfig;
use crate::error::{ApiError, PollFailure};
use crate::job_list::JobListPoller;
use crate::job_status::{JobStatusPoller, JobStatusView, StopOutcome};
use crate::log_tail::LogTailer;
use crate::progress::{ConsoleEvent, ConsoleReporter, OutputMode};

/// Validates `form` and starts the job. Nothing is sent if validation fails.
pub async fn start_job(api: &dyn IndexerApi, form: StartJobForm) -> Result<StartedJob, ApiError> {
    let request = form.into_request()?;
    let started = api.start_job(&request).await?;
    info!(job = started.id, kind = %request.kind, "job started");
    Ok(started)
}

fn poll_error(failure: &PollFailure) -> anyhow::Error {
    if failure.is_unauthorized() {
        ApiError::Unauthorized { detail: None }.into()
    } else {
        anyhow::anyhow!(failure.message.clone())
    }
}

pub async fn run_jobs_list(
    api: Arc<dyn IndexerApi>,
    filter: JobListFilter,
    watch: bool,
    mode: OutputMode,
    polling: &PollingConfig,
) -> Result<()> {
    let reporter = mode.reporter();
    if !watch {
        let jobs = api.list_jobs(&filter).await?;
        reporter.report(ConsoleEvent::JobList(&jobs));
        return Ok(());
    }

    let handle = JobListPoller::start(api, filter, polling.job_list_interval());
    let mut views = handle.subscribe();
    let mut seen = 0;
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if view.fetches == seen {
                    continue;
                }
                seen = view.fetches;
                if let Some(failure) = view.last_error.as_ref().filter(|f| f.is_unauthorized()) {
                    return Err(poll_error(failure));
                }
                if let Some(jobs) = &view.jobs {
                    reporter.report(ConsoleEvent::JobList(jobs));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.shutdown().await;
    Ok(())
}

pub async fn run_jobs_show(
    api: Arc<dyn IndexerApi>,
    id: u64,
    watch: bool,
    with_logs: bool,
    mode: OutputMode,
    polling: &PollingConfig,
) -> Result<()> {
    let reporter = mode.reporter();
    if !watch {
        match api.get_job(id).await {
            Ok(job) => reporter.report(ConsoleEvent::Job(&job)),
            Err(ApiError::NotFound) => {
                reporter.report(ConsoleEvent::NotFound(id));
                bail!("job #{} not found", id);
            }
            Err(e) => return Err(e.into()),
        }
        if with_logs {
            let response = api.tail_logs(id, None).await?;
            reporter.report(ConsoleEvent::Logs {
                process_id: id,
                entries: &response.logs,
            });
        }
        return Ok(());
    }

    let status = JobStatusPoller::start(api.clone(), id, polling.job_status_interval());
    let mut logs = with_logs.then(|| LogTailer::start(api, id, polling.log_tail_interval()));
    let mut status_rx = status.subscribe();
    let mut logs_rx = logs.as_ref().map(|l| l.subscribe());
    let mut seen_status = 0;
    let mut seen_logs = 0;
    let mut finished = false;

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = status_rx.borrow_and_update().clone();
                if view.fetches == seen_status {
                    continue;
                }
                seen_status = view.fetches;
                if let Some(failure) = view.last_error.as_ref().filter(|f| f.is_unauthorized()) {
                    return Err(poll_error(failure));
                }
                if report_status(&*reporter, &view) {
                    finished = true;
                    break;
                }
            }
            Some(()) = async {
                match logs_rx.as_mut() {
                    Some(rx) => rx.changed().await.ok(),
                    None => std::future::pending().await,
                }
            } => {
                if let Some(rx) = logs_rx.as_mut() {
                    let view = rx.borrow_and_update().clone();
                    if view.fetches != seen_logs {
                        seen_logs = view.fetches;
                        if view.last_batch > 0 {
                            reporter.report(ConsoleEvent::Logs {
                                process_id: id,
                                entries: view.latest(),
                            });
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Residual shutdown logs can land after the terminal status.
    if let Some(tailer) = logs.as_mut().filter(|_| finished) {
        let view = tailer.drain().await;
        if view.fetches != seen_logs && view.last_batch > 0 {
            reporter.report(ConsoleEvent::Logs {
                process_id: id,
                entries: view.latest(),
            });
        }
    }
    if let Some(tailer) = logs {
        tailer.shutdown().await;
    }
    status.shutdown().await;
    Ok(())
}

/// Prints a status view; returns true once nothing more will change.
fn report_status(reporter: &dyn ConsoleReporter, view: &JobStatusView) -> bool {
    match view.phase {
        StatusPhase::NotFound => {
            reporter.report(ConsoleEvent::NotFound(view.id));
            true
        }
        phase => {
            if let Some(job) = &view.process {
                reporter.report(ConsoleEvent::Job(job));
            }
            phase == StatusPhase::Terminal
        }
    }
}

pub async fn run_jobs_start(
    api: Arc<dyn IndexerApi>,
    form: StartJobForm,
    watch: bool,
    mode: OutputMode,
    polling: &PollingConfig,
) -> Result<()> {
    let kind = form.kind;
    let started = start_job(api.as_ref(), form)
        .await
        .map_err(|e| anyhow::Error::new(e).context(format!("could not start {}", kind)))?;
    match mode {
        OutputMode::Human => println!("Started {} job #{}.", kind, started.id),
        OutputMode::Json => println!(
            "{}",
            serde_json::json!({ "event": "started", "id": started.id })
        ),
    }
    if watch {
        run_jobs_show(api, started.id, true, true, mode, polling).await?;
    }
    Ok(())
}

pub async fn run_jobs_stop(
    api: Arc<dyn IndexerApi>,
    id: u64,
    yes: bool,
    polling: &PollingConfig,
) -> Result<()> {
    let handle = JobStatusPoller::start(api, id, polling.job_status_interval());
    let mut views = handle.subscribe();
    let view = views.wait_for(|v| v.fetches > 0).await?.clone();
    if let Some(failure) = view.last_error.as_ref().filter(|f| f.is_unauthorized()) {
        return Err(poll_error(failure));
    }

    match (&view.process, view.phase.is_final()) {
        (None, true) => bail!("job #{} not found", id),
        (Some(job), true) => {
            println!("Job #{} is already {}.", id, job.status);
            return Ok(());
        }
        _ => {}
    }

    if !yes && !atty::is(atty::Stream::Stdin) {
        bail!("refusing to stop job #{} without --yes when stdin is not a terminal", id);
    }
    // The poller keeps running while the operator answers.
    let confirmed = yes || confirm(format!("Stop job #{}? This cannot be undone.", id)).await?;
    let outcome = handle
        .stop(|_| confirmed)
        .await
        .map_err(|e| anyhow::Error::new(e).context(format!("could not stop job #{}", id)))?;

    match outcome {
        StopOutcome::Declined => println!("Not stopped."),
        StopOutcome::Stopped => {
            let seen = view.fetches;
            let after = views.wait_for(|v| v.fetches > seen).await?.clone();
            let status = after
                .process
                .map(|p| p.status.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Stop requested for job #{} (status: {}).", id, status);
        }
    }
    handle.shutdown().await;
    Ok(())
}

pub async fn run_logs(
    api: Arc<dyn IndexerApi>,
    id: u64,
    follow: bool,
    mode: OutputMode,
    polling: &PollingConfig,
) -> Result<()> {
    let reporter = mode.reporter();
    if !follow {
        let response = api.tail_logs(id, None).await?;
        reporter.report(ConsoleEvent::Logs {
            process_id: id,
            entries: &response.logs,
        });
        return Ok(());
    }

    let tailer = LogTailer::start(api, id, polling.log_tail_interval());
    let mut views = tailer.subscribe();
    let mut seen = 0;
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if view.fetches == seen {
                    continue;
                }
                seen = view.fetches;
                if let Some(failure) = view.last_error.as_ref().filter(|f| f.is_unauthorized()) {
                    return Err(poll_error(failure));
                }
                if view.last_batch > 0 {
                    reporter.report(ConsoleEvent::Logs {
                        process_id: id,
                        entries: view.latest(),
                    });
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    tailer.shutdown().await;
    Ok(())
}

async fn confirm(question: String) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || {
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer).map(|_| answer)
    })
    .await?;
    Ok(answer.map(|a| is_affirmative(&a)).unwrap_or(false))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES \n"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("n\n"));
        assert!(!is_affirmative("yep\n"));
    }
}
