//! Filter state → `POST /api/search-licitaciones` payload.
//!
//! Rules applied at this boundary only:
//!
//! - string fields are trimmed and dropped when empty or equal to `"all"`;
//! - dates are kept as `YYYY-MM-DD` in the filter state and sent as
//!   `DD/MM/YYYY`; anything that does not parse is sent unchanged;
//! - `user_tag_ids` is sent only when non-empty;
//! - `page`, `page_size` and `incluirVencidos` are always sent.

use chrono::NaiveDate;
use serde::Serialize;

use crate::filters::{FilterMode, SearchFilterState};

/// Request body for the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub page: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(rename = "incluirVencidos")]
    pub incluir_vencidos: &'static str,
    #[serde(rename = "soloVigentes", skip_serializing_if = "Option::is_none")]
    pub solo_vigentes: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objeto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agencia: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pais: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apertura_fr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apertura_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_tag_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_mode: Option<&'static str>,
}

/// Builds the search payload for `filters`.
pub fn build_search_request(filters: &SearchFilterState) -> SearchRequest {
    SearchRequest {
        page: filters.page(),
        page_size: filters.page_size().get(),
        search: non_empty(filters.search()),
        incluir_vencidos: if filters.include_expired() { "1" } else { "0" },
        solo_vigentes: filters.only_current().then_some("1"),
        objeto: non_empty(filters.objeto()),
        agencia: non_empty(filters.agencia()),
        pais: non_empty(filters.pais()),
        rubro: non_empty(filters.rubro()),
        apertura_fr: non_empty(filters.apertura_from()).map(|d| to_wire_date(&d)),
        apertura_to: non_empty(filters.apertura_to()).map(|d| to_wire_date(&d)),
        user_tag_ids: (!filters.user_tag_ids().is_empty())
            .then(|| filters.user_tag_ids().to_vec()),
        filter_mode: match filters.filter_mode() {
            FilterMode::All => None,
            mode => Some(mode.as_str()),
        },
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "all" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `YYYY-MM-DD` → `DD/MM/YYYY`; unparseable input is returned as-is.
pub fn to_wire_date(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => d.format("%d/%m/%Y").to_string(),
        Err(_) => date.to_string(),
    }
}

/// `DD/MM/YYYY` or `YYYY-MM-DD` → `YYYY-MM-DD`; unparseable input is returned as-is.
pub fn from_wire_date(date: &str) -> String {
    let date = date.trim();
    NaiveDate::parse_from_str(date, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| date.to_string())
}

/// Parses free-text tag input such as `"1, 2, x, 3"`.
///
/// Tokens that are not integers are dropped silently.
pub fn parse_tag_ids(input: &str) -> Vec<i64> {
    input
        .split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .collect()
}
