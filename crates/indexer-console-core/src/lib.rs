//! # Indexer Console Core
//!
//! Pure logic for the indexer console: wire models, search filter state,
//! query building, result paging and log buffering.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Everything
//! here is deterministic given its inputs, which is what lets the async
//! controllers in the `indexer-console` crate stay thin.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Jobs, progress, log entries, publications, result pages |
//! | [`filters`] | Immutable search filter state and typed filter changes |
//! | [`query`] | Filter state → search request payload |
//! | [`results`] | Result page store with sequence tokens and paging |
//! | [`logs`] | Cursor-based log buffer |
//! | [`jobs`] | Start-job forms and the job status state machine |
//! | [`error`] | Client-side validation errors |

pub mod error;
pub mod filters;
pub mod jobs;
pub mod logs;
pub mod models;
pub mod query;
pub mod results;

pub use error::ValidationError;
pub use filters::{FilterChange, FilterMode, IntentClass, PageSize, SearchFilterState};
pub use models::{
    IndexerProcess, IndexerStatus, IndexerType, LogEntry, LogsResponse, ProgressSnapshot,
    ProgressStage, Publication, SearchResultPage,
};
