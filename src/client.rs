//! REST client for the indexer service.
//!
//! [`IndexerApi`] is the seam every controller and poller talks through;
//! [`HttpApiClient`] is the `reqwest` implementation used by the `ixc`
//! binary. Tests substitute their own implementations.
//!
//! # Endpoints
//!
//! | Method | Path | Call |
//! |--------|------|------|
//! | `GET`  | `/api/indexers?status=&type=` | [`IndexerApi::list_jobs`] |
//! | `GET`  | `/api/indexers/{id}` | [`IndexerApi::get_job`] |
//! | `POST` | `/api/indexers/start` | [`IndexerApi::start_job`] |
//! | `POST` | `/api/indexers/{id}/stop` | [`IndexerApi::stop_job`] |
//! | `GET`  | `/api/indexers/{id}/logs?since=` | [`IndexerApi::tail_logs`] |
//! | `POST` | `/api/search-licitaciones` | [`IndexerApi::search`] |
//! | `POST` | `/api/auth/login` | [`HttpApiClient::login`] |
//!
//! Non-success responses are mapped through [`ApiError::from_status`], with
//! the `detail` field of the JSON error body kept as the message.

use std::time::Duration;

use async_trait::async_trait;
use indexer_console_core::jobs::{JobListFilter, StartJobRequest};
use indexer_console_core::models::StartedJob;
use indexer_console_core::query::SearchRequest;
use indexer_console_core::{IndexerProcess, LogsResponse, SearchResultPage};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::session::LoginResponse;

/// Operations the console needs from the indexer service.
#[async_trait]
pub trait IndexerApi: Send + Sync {
    async fn list_jobs(&self, filter: &JobListFilter) -> Result<Vec<IndexerProcess>, ApiError>;

    async fn get_job(&self, id: u64) -> Result<IndexerProcess, ApiError>;

    async fn start_job(&self, request: &StartJobRequest) -> Result<StartedJob, ApiError>;

    async fn stop_job(&self, id: u64) -> Result<(), ApiError>;

    /// Log entries newer than `since`; `None` asks for the full history.
    async fn tail_logs(&self, id: u64, since: Option<&str>) -> Result<LogsResponse, ApiError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResultPage, ApiError>;
}

/// `reqwest`-backed [`IndexerApi`].
#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApiClient {
    /// Builds a client for `config.base_url`, sending `token` as a bearer
    /// credential on every request when present.
    pub fn new(config: &ApiConfig, token: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges credentials for an access token. Sent without a bearer.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let rb = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&body);
        debug!("POST /api/auth/login ({})", username);
        read_json(rb).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!("{} {}", method, path);
        let rb = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }
}

#[async_trait]
impl IndexerApi for HttpApiClient {
    async fn list_jobs(&self, filter: &JobListFilter) -> Result<Vec<IndexerProcess>, ApiError> {
        let rb = self
            .request(Method::GET, "/api/indexers")
            .query(&filter.query_pairs());
        read_json(rb).await
    }

    async fn get_job(&self, id: u64) -> Result<IndexerProcess, ApiError> {
        read_json(self.request(Method::GET, &format!("/api/indexers/{}", id))).await
    }

    async fn start_job(&self, request: &StartJobRequest) -> Result<StartedJob, ApiError> {
        let rb = self
            .request(Method::POST, "/api/indexers/start")
            .json(request);
        read_json(rb).await
    }

    async fn stop_job(&self, id: u64) -> Result<(), ApiError> {
        let rb = self.request(Method::POST, &format!("/api/indexers/{}/stop", id));
        check_status(rb.send().await?).await?;
        Ok(())
    }

    async fn tail_logs(&self, id: u64, since: Option<&str>) -> Result<LogsResponse, ApiError> {
        let mut rb = self.request(Method::GET, &format!("/api/indexers/{}/logs", id));
        if let Some(since) = since {
            rb = rb.query(&[("since", since)]);
        }
        read_json(rb).await
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResultPage, ApiError> {
        let rb = self
            .request(Method::POST, "/api/search-licitaciones")
            .json(request);
        read_json(rb).await
    }
}

async fn read_json<T: DeserializeOwned>(rb: RequestBuilder) -> Result<T, ApiError> {
    let response = check_status(rb.send().await?).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), error_detail(&body)))
}

/// Pulls `detail` out of an error body such as `{"detail": "..."}`.
///
/// Non-string details (validation error lists) are kept as JSON text.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_extraction() {
        assert_eq!(
            error_detail(r#"{"detail":"process not running"}"#).as_deref(),
            Some("process not running")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":["body"]}]}"#).as_deref(),
            Some(r#"[{"loc":["body"]}]"#)
        );
        assert_eq!(error_detail("<html>bad gateway</html>"), None);
        assert_eq!(error_detail(r#"{"detail":null}"#), None);
    }
}
