//! Errors at the REST boundary.
//!
//! Every call through [`IndexerApi`](crate::client::IndexerApi) fails with an
//! [`ApiError`]. Pollers log these and wait for their next tick; one-shot
//! actions hand them back to the caller, which shows
//! [`ApiError::user_message`] to the operator.

use indexer_console_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, reset, DNS failure. Retried by the next poll only.
    #[error("network error: {0}")]
    Network(String),

    /// 4xx other than 401/404.
    #[error("request rejected (HTTP {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },

    /// 5xx.
    #[error("server error (HTTP {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },

    #[error("not found")]
    NotFound,

    /// Left to the session collaborator.
    #[error("not authenticated; run `ixc login`")]
    Unauthorized { detail: Option<String> },

    /// Rejected locally, nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl ApiError {
    /// Maps a non-success HTTP status and the server's `detail` message.
    pub fn from_status(status: u16, detail: Option<String>) -> ApiError {
        match status {
            401 => ApiError::Unauthorized { detail },
            404 => ApiError::NotFound,
            s if s >= 500 => ApiError::Server { status: s, detail },
            s => ApiError::Rejected { status: s, detail },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::NotFound => Some(404),
            ApiError::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// Server-supplied message, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { detail, .. }
            | ApiError::Server { detail, .. }
            | ApiError::Unauthorized { detail } => detail.as_deref(),
            _ => None,
        }
    }

    /// Failures that the next scheduled poll may well not see again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Server { .. })
    }

    /// Message for one-shot actions: the server's detail verbatim, or the
    /// error itself.
    pub fn user_message(&self) -> String {
        match self.detail() {
            Some(detail) => detail.to_string(),
            None => self.to_string(),
        }
    }

    /// Message for a failed search.
    pub fn search_message(&self) -> String {
        match self {
            ApiError::Server { status: 503, .. } => "search backend unavailable".to_string(),
            ApiError::Server { status: 500, .. } => "search backend error".to_string(),
            ApiError::Validation(e) => e.to_string(),
            other => other
                .detail()
                .map(str::to_string)
                .unwrap_or_else(|| "search request failed".to_string()),
        }
    }
}

/// A swallowed poll failure, kept in a poller's view until the next
/// successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub message: String,
    pub status: Option<u16>,
}

impl PollFailure {
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

impl From<&ApiError> for PollFailure {
    fn from(e: &ApiError) -> Self {
        PollFailure {
            message: e.user_message(),
            status: e.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ApiError::from_status(401, None),
            ApiError::Unauthorized { detail: None }
        ));
        assert!(matches!(ApiError::from_status(404, None), ApiError::NotFound));
        assert!(matches!(
            ApiError::from_status(422, None),
            ApiError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            ApiError::from_status(502, None),
            ApiError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn search_messages() {
        let unavailable = ApiError::from_status(503, Some("es down".into()));
        assert_eq!(unavailable.search_message(), "search backend unavailable");
        let failed = ApiError::from_status(500, None);
        assert_eq!(failed.search_message(), "search backend error");
        let rejected = ApiError::from_status(400, Some("page_size inválido".into()));
        assert_eq!(rejected.search_message(), "page_size inválido");
        let bare = ApiError::from_status(400, None);
        assert_eq!(bare.search_message(), "search request failed");
        let network = ApiError::Network("refused".into());
        assert_eq!(network.search_message(), "search request failed");
    }

    #[test]
    fn user_message_prefers_detail() {
        let e = ApiError::from_status(409, Some("process already stopped".into()));
        assert_eq!(e.user_message(), "process already stopped");
        assert_eq!(ApiError::NotFound.user_message(), "not found");
        let expired = ApiError::from_status(401, Some("token expired".into()));
        assert_eq!(expired.user_message(), "token expired");
        assert_eq!(
            ApiError::from_status(401, None).user_message(),
            "not authenticated; run `ixc login`"
        );
    }
}
