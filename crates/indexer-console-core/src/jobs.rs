//! Job forms, list filters, and the per-job status state machine.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ValidationError;
use crate::models::{IndexerStatus, IndexerType};

/// Body of `POST /api/indexers/start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartJobRequest {
    #[serde(rename = "type")]
    pub kind: IndexerType,
    pub params: Value,
}

/// Raw operator input for starting a job, validated by
/// [`into_request`](StartJobForm::into_request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartJobForm {
    pub kind: IndexerType,
    pub publicacion_id: Option<String>,
    pub scraper_id: Option<String>,
    pub since: Option<String>,
}

impl StartJobForm {
    pub fn new(kind: IndexerType) -> Self {
        Self {
            kind,
            publicacion_id: None,
            scraper_id: None,
            since: None,
        }
    }

    /// Checks the inputs `kind` needs and builds the request body.
    ///
    /// Inputs the kind does not use are ignored.
    pub fn into_request(self) -> Result<StartJobRequest, ValidationError> {
        let mut params = Map::new();
        match self.kind {
            IndexerType::IndexLicitacion => {
                let id = required_id("publicacion_id", self.publicacion_id.as_deref())?;
                params.insert("publicacion_id".into(), json!(id));
            }
            IndexerType::IndexScraperPublications => {
                let id = required_id("scraper_id", self.scraper_id.as_deref())?;
                let since = required_since(self.since.as_deref())?;
                params.insert("scraper_id".into(), json!(id));
                params.insert("since".into(), json!(since));
            }
            IndexerType::SyncSince => {
                let since = required_since(self.since.as_deref())?;
                params.insert("since".into(), json!(since));
            }
            IndexerType::IndexBulk => {}
        }
        Ok(StartJobRequest {
            kind: self.kind,
            params: Value::Object(params),
        })
    }
}

fn required_id(field: &'static str, value: Option<&str>) -> Result<u64, ValidationError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::Missing { field })?;
    value.parse::<u64>().map_err(|_| ValidationError::NotNumeric {
        field,
        value: value.to_string(),
    })
}

fn required_since(value: Option<&str>) -> Result<String, ValidationError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::Missing { field: "since" })?;
    normalize_since(value)
}

const SINCE_INPUT_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Normalizes a date-time input to the server's `YYYY-MM-DD HH:MM:SS`.
///
/// A bare `YYYY-MM-DD` means midnight.
pub fn normalize_since(input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    let parsed = SINCE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ValidationError::BadDateTime(input.to_string()))?;
    Ok(parsed.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Optional filters for `GET /api/indexers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobListFilter {
    pub status: Option<IndexerStatus>,
    pub kind: Option<IndexerType>,
}

impl JobListFilter {
    /// Query pairs; absent filters are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str()));
        }
        if let Some(kind) = self.kind {
            pairs.push(("type", kind.as_str()));
        }
        pairs
    }
}

/// Where a job status poller is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPhase {
    #[default]
    Loading,
    Polling,
    Terminal,
    NotFound,
}

/// Result of one status fetch, reduced to what drives the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Snapshot(IndexerStatus),
    Missing,
    Failed,
}

impl StatusPhase {
    /// Next phase after `outcome`. `Terminal` and `NotFound` are final.
    pub fn advance(self, outcome: FetchOutcome) -> StatusPhase {
        match (self, outcome) {
            (StatusPhase::Terminal, _) => StatusPhase::Terminal,
            (StatusPhase::NotFound, _) => StatusPhase::NotFound,
            (_, FetchOutcome::Snapshot(status)) if status.is_terminal() => StatusPhase::Terminal,
            (_, FetchOutcome::Snapshot(_)) => StatusPhase::Polling,
            (_, FetchOutcome::Missing) => StatusPhase::NotFound,
            (phase, FetchOutcome::Failed) => phase,
        }
    }

    /// No further fetch is scheduled from a final phase.
    pub fn is_final(&self) -> bool {
        matches!(self, StatusPhase::Terminal | StatusPhase::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_since_normalizes_datetime_local_input() {
        let form = StartJobForm {
            since: Some("2024-01-15T10:00".into()),
            ..StartJobForm::new(IndexerType::SyncSince)
        };
        let req = form.into_request().unwrap();
        assert_eq!(req.params["since"], "2024-01-15 10:00:00");
        assert_eq!(
            serde_json::to_value(&req).unwrap()["type"],
            "sync-since"
        );
    }

    #[test]
    fn scraper_job_needs_id_and_since() {
        let mut form = StartJobForm::new(IndexerType::IndexScraperPublications);
        form.scraper_id = Some("12".into());
        assert_eq!(
            form.clone().into_request(),
            Err(ValidationError::Missing { field: "since" })
        );
        form.since = Some("2024-02-01 08:30".into());
        let req = form.into_request().unwrap();
        assert_eq!(req.params["scraper_id"], 12);
        assert_eq!(req.params["since"], "2024-02-01 08:30:00");
    }

    #[test]
    fn publication_id_must_be_numeric() {
        let mut form = StartJobForm::new(IndexerType::IndexLicitacion);
        assert_eq!(
            form.clone().into_request(),
            Err(ValidationError::Missing {
                field: "publicacion_id"
            })
        );
        form.publicacion_id = Some("abc".into());
        assert!(matches!(
            form.into_request(),
            Err(ValidationError::NotNumeric { .. })
        ));
    }

    #[test]
    fn bulk_has_no_params() {
        let req = StartJobForm::new(IndexerType::IndexBulk)
            .into_request()
            .unwrap();
        assert_eq!(req.params, json!({}));
    }

    #[test]
    fn bad_since_is_rejected() {
        assert!(normalize_since("yesterday").is_err());
        assert_eq!(normalize_since("2024-01-15").unwrap(), "2024-01-15 00:00:00");
    }

    #[test]
    fn list_filter_pairs() {
        let filter = JobListFilter {
            status: Some(IndexerStatus::Running),
            kind: None,
        };
        assert_eq!(filter.query_pairs(), vec![("status", "running")]);
        assert!(JobListFilter::default().query_pairs().is_empty());
    }

    #[test]
    fn terminal_is_one_way() {
        let phase = StatusPhase::Loading
            .advance(FetchOutcome::Snapshot(IndexerStatus::Running))
            .advance(FetchOutcome::Failed);
        assert_eq!(phase, StatusPhase::Polling);

        let done = phase.advance(FetchOutcome::Snapshot(IndexerStatus::Stopped));
        assert_eq!(done, StatusPhase::Terminal);
        assert!(done.is_final());
        assert_eq!(
            done.advance(FetchOutcome::Snapshot(IndexerStatus::Running)),
            StatusPhase::Terminal
        );
        assert_eq!(
            StatusPhase::Loading.advance(FetchOutcome::Missing),
            StatusPhase::NotFound
        );
        assert_eq!(
            StatusPhase::Loading.advance(FetchOutcome::Failed),
            StatusPhase::Loading
        );
    }
}
