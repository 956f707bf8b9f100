//! Wire models shared by the REST client, the pollers, and the CLI.
//!
//! Field names follow the indexer service's JSON exactly (including the
//! Spanish search fields), so every type here round-trips through `serde`
//! without custom adapters, with one exception: [`ProgressSnapshot`] is
//! decoded from a bag of optional counters into a tagged shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Kind of indexing job the server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexerType {
    IndexLicitacion,
    IndexScraperPublications,
    IndexBulk,
    SyncSince,
}

impl IndexerType {
    pub const ALL: [IndexerType; 4] = [
        IndexerType::IndexLicitacion,
        IndexerType::IndexScraperPublications,
        IndexerType::SyncSince,
        IndexerType::IndexBulk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexerType::IndexLicitacion => "index-licitacion",
            IndexerType::IndexScraperPublications => "index-scraper-publications",
            IndexerType::IndexBulk => "index-bulk",
            IndexerType::SyncSince => "sync-since",
        }
    }

    /// Operator-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            IndexerType::IndexLicitacion => "Index publication",
            IndexerType::IndexScraperPublications => "Index scraper publications",
            IndexerType::IndexBulk => "Bulk index",
            IndexerType::SyncSince => "Sync since date",
        }
    }
}

impl fmt::Display for IndexerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexerType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownType(s.to_string()))
    }
}

/// Lifecycle status of a job as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl IndexerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexerStatus::Running => "running",
            IndexerStatus::Completed => "completed",
            IndexerStatus::Failed => "failed",
            IndexerStatus::Stopped => "stopped",
        }
    }

    /// A terminal status never transitions again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IndexerStatus::Running)
    }
}

impl fmt::Display for IndexerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "running" => Ok(IndexerStatus::Running),
            "completed" => Ok(IndexerStatus::Completed),
            "failed" => Ok(IndexerStatus::Failed),
            "stopped" => Ok(IndexerStatus::Stopped),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Server-side snapshot of one indexing job.
///
/// Only the server mutates jobs; the client replaces its copy wholesale on
/// every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerProcess {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: IndexerType,
    pub status: IndexerStatus,
    #[serde(default)]
    pub params: serde_json::Value,
    pub started_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl IndexerProcess {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Indexed / failed tally reported by jobs that count documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub indexed: u64,
    pub failed: u64,
}

/// Shape of a progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStage {
    /// No total known; no percentage can be computed.
    Indeterminate,
    /// `current` out of a known, non-zero `total`.
    Bounded {
        current: u64,
        total: u64,
        tally: Option<Tally>,
    },
    /// Only document counts are known.
    Counted(Tally),
}

/// Progress of a job, decoded from the server's optional counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawProgress", into = "RawProgress")]
pub struct ProgressSnapshot {
    pub stage: ProgressStage,
    pub message: Option<String>,
}

impl ProgressSnapshot {
    /// Completion percentage in `[0, 100]`, only for bounded progress.
    pub fn percent(&self) -> Option<f64> {
        match self.stage {
            ProgressStage::Bounded { current, total, .. } if total > 0 => {
                Some((current as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        }
    }

    pub fn tally(&self) -> Option<Tally> {
        match self.stage {
            ProgressStage::Bounded { tally, .. } => tally,
            ProgressStage::Counted(tally) => Some(tally),
            ProgressStage::Indeterminate => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    indexed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<RawProgress> for ProgressSnapshot {
    fn from(raw: RawProgress) -> Self {
        let tally = raw.indexed.map(|indexed| Tally {
            indexed,
            failed: raw.failed.unwrap_or(0),
        });
        let stage = match raw.total {
            // A zero total carries no more information than a missing one.
            Some(total) if total > 0 => ProgressStage::Bounded {
                current: raw.current.unwrap_or(0),
                total,
                tally,
            },
            _ => match tally {
                Some(tally) => ProgressStage::Counted(tally),
                None => ProgressStage::Indeterminate,
            },
        };
        ProgressSnapshot {
            stage,
            message: raw.message.filter(|m| !m.is_empty()),
        }
    }
}

impl From<ProgressSnapshot> for RawProgress {
    fn from(snapshot: ProgressSnapshot) -> Self {
        let mut raw = RawProgress {
            message: snapshot.message,
            ..Default::default()
        };
        let tally = match snapshot.stage {
            ProgressStage::Indeterminate => None,
            ProgressStage::Bounded {
                current,
                total,
                tally,
            } => {
                raw.current = Some(current);
                raw.total = Some(total);
                tally
            }
            ProgressStage::Counted(tally) => Some(tally),
        };
        if let Some(t) = tally {
            raw.indexed = Some(t.indexed);
            raw.failed = Some(t.failed);
        }
        raw
    }
}

/// One line of a job's log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// Response of `GET /api/indexers/{id}/logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub last_timestamp: Option<String>,
}

/// Response of `POST /api/indexers/start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedJob {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub descripcion: String,
}

/// Read-only projection of an indexed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: u64,
    #[serde(default)]
    pub scraper: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub objeto: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agencia: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pais: String,
    #[serde(default)]
    pub pais_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub apertura: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vigente: bool,
    /// Any field this client does not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Reads an explicit `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub publicaciones: Vec<Publication>,
    pub total: u64,
    pub pagina: u32,
    pub paginas: u32,
}

impl SearchResultPage {
    pub fn is_empty(&self) -> bool {
        self.publicaciones.is_empty()
    }
}
