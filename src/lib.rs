//! # Indexer Console
//!
//! Operator console for the publication indexing service: watch indexing
//! jobs, start and stop them, tail their logs, and run filtered searches
//! over the indexed publications.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   commands    ┌──────────────────┐   REST   ┌──────────┐
//! │  CLI (ixc)   │──────────────▶│ controllers and  │─────────▶│ indexer  │
//! │              │◀──────────────│ pollers (tokio)  │◀─────────│ service  │
//! └──────────────┘  watch views  └────────┬─────────┘          └──────────┘
//!                                         │ pure logic
//!                                         ▼
//!                                ┌──────────────────┐
//!                                │ indexer-console- │
//!                                │ core             │
//!                                └──────────────────┘
//! ```
//!
//! Every periodic subsystem is a spawned task owned by a handle. Dropping
//! the handle cancels the task, its pending timers and its in-flight
//! requests.
//!
//! ## Quick Start
//!
//! ```bash
//! ixc login --username ana
//! ixc jobs list --status running --watch
//! ixc jobs start sync-since --since 2024-01-15T10:00 --watch
//! ixc logs 42 --follow
//! ixc search --text "puente" --page-size 50
//! ixc search --interactive
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | REST boundary errors |
//! | [`client`] | [`IndexerApi`](client::IndexerApi) trait and `reqwest` client |
//! | [`session`] | Persisted bearer session with expiry check |
//! | [`debounce`] | Per-class debounce deadlines |
//! | [`search`] | Search controller, `ixc search` |
//! | [`job_status`] | Per-job status poller and stop action |
//! | [`job_list`] | Filtered job list poller |
//! | [`log_tail`] | Cursor-based log tailer |
//! | [`actions`] | Start/stop one-shots, `ixc jobs` and `ixc logs` |
//! | [`progress`] | Human and JSON rendering |

pub mod actions;
pub mod client;
pub mod config;
pub mod debounce;
pub mod error;
pub mod job_list;
pub mod job_status;
pub mod log_tail;
pub mod progress;
pub mod search;
pub mod session;

pub use client::{HttpApiClient, IndexerApi};
pub use error::ApiError;
