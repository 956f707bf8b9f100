//! Search filter state and the typed changes that drive it.
//!
//! [`SearchFilterState`] is an immutable value: every edit goes through
//! [`SearchFilterState::apply`] with a [`FilterChange`], which is also what
//! the search controller queues as an intent. Each change knows its
//! [`IntentClass`], so the debounce policy is decided in one place instead of
//! per field.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Allowed page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageSize {
    #[default]
    Fifteen,
    Fifty,
    Hundred,
    TwoHundred,
}

impl PageSize {
    pub const ALL: [PageSize; 4] = [
        PageSize::Fifteen,
        PageSize::Fifty,
        PageSize::Hundred,
        PageSize::TwoHundred,
    ];

    pub fn get(&self) -> u32 {
        match self {
            PageSize::Fifteen => 15,
            PageSize::Fifty => 50,
            PageSize::Hundred => 100,
            PageSize::TwoHundred => 200,
        }
    }
}

impl TryFrom<u32> for PageSize {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PageSize::ALL
            .into_iter()
            .find(|p| p.get() == value)
            .ok_or(ValidationError::PageSize(value))
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Whether results are restricted to the operator's own tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    All,
    UserTags,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::All => "all",
            FilterMode::UserTags => "user_tags",
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(FilterMode::All),
            "user_tags" | "user-tags" | "tags" => Ok(FilterMode::UserTags),
            other => Err(format!(
                "unknown filter mode '{}', expected all or user_tags",
                other
            )),
        }
    }
}

/// How quickly a change should turn into a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentClass {
    /// Free text, edited keystroke by keystroke: long quiet period.
    Text,
    /// Selects, dates and tag ids: short quiet period.
    Structured,
    /// Discrete paging actions: no debounce.
    Immediate,
}

/// A single edit to the filter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Search(String),
    IncludeExpired(bool),
    OnlyCurrent(bool),
    Objeto(String),
    Agencia(String),
    Pais(String),
    Rubro(String),
    /// Opening date lower bound, `YYYY-MM-DD`.
    AperturaFrom(String),
    /// Opening date upper bound, `YYYY-MM-DD`.
    AperturaTo(String),
    UserTagIds(Vec<i64>),
    FilterMode(FilterMode),
    Page(u32),
    PageSize(PageSize),
}

impl FilterChange {
    pub fn class(&self) -> IntentClass {
        match self {
            FilterChange::Search(_) => IntentClass::Text,
            FilterChange::Page(_) | FilterChange::PageSize(_) => IntentClass::Immediate,
            _ => IntentClass::Structured,
        }
    }
}

/// Everything the operator can filter search results by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilterState {
    page: u32,
    page_size: PageSize,
    search: String,
    include_expired: bool,
    only_current: bool,
    objeto: String,
    agencia: String,
    pais: String,
    rubro: String,
    apertura_from: String,
    apertura_to: String,
    user_tag_ids: Vec<i64>,
    filter_mode: FilterMode,
}

impl Default for SearchFilterState {
    fn default() -> Self {
        Self::new(PageSize::default())
    }
}

impl SearchFilterState {
    /// Fresh filter state: first page, nothing filtered.
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page: 1,
            page_size,
            search: String::new(),
            include_expired: false,
            only_current: false,
            objeto: String::new(),
            agencia: String::new(),
            pais: String::new(),
            rubro: String::new(),
            apertura_from: String::new(),
            apertura_to: String::new(),
            user_tag_ids: Vec::new(),
            filter_mode: FilterMode::All,
        }
    }

    /// Returns the state after `change`.
    ///
    /// Any change other than `Page` or `PageSize` returns to page 1. A page
    /// size change keeps the page number; the caller clamps it against the
    /// new page count.
    pub fn apply(&self, change: FilterChange) -> SearchFilterState {
        let mut next = self.clone();
        match change {
            FilterChange::Page(page) => {
                next.page = page.max(1);
                return next;
            }
            FilterChange::PageSize(size) => {
                next.page_size = size;
                return next;
            }
            FilterChange::Search(v) => next.search = v,
            FilterChange::IncludeExpired(v) => next.include_expired = v,
            FilterChange::OnlyCurrent(v) => next.only_current = v,
            FilterChange::Objeto(v) => next.objeto = v,
            FilterChange::Agencia(v) => next.agencia = v,
            FilterChange::Pais(v) => next.pais = v,
            FilterChange::Rubro(v) => next.rubro = v,
            FilterChange::AperturaFrom(v) => next.apertura_from = v,
            FilterChange::AperturaTo(v) => next.apertura_to = v,
            FilterChange::UserTagIds(v) => next.user_tag_ids = v,
            FilterChange::FilterMode(v) => next.filter_mode = v,
        }
        next.page = 1;
        next
    }

    /// Same filters on another page (never below 1).
    pub fn with_page(&self, page: u32) -> SearchFilterState {
        SearchFilterState {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// Back to the defaults, keeping the page size.
    pub fn cleared(&self) -> SearchFilterState {
        SearchFilterState::new(self.page_size)
    }

    /// Number of filters that differ from the defaults.
    pub fn active_filter_count(&self) -> usize {
        let text_fields = [&self.search, &self.objeto, &self.agencia]
            .into_iter()
            .filter(|v| !v.is_empty())
            .count();
        let select_fields = [&self.pais, &self.rubro]
            .into_iter()
            .filter(|v| !v.is_empty() && v.as_str() != "all")
            .count();
        let dates = [&self.apertura_from, &self.apertura_to]
            .into_iter()
            .filter(|v| !v.is_empty())
            .count();
        text_fields
            + select_fields
            + dates
            + usize::from(self.include_expired)
            + usize::from(self.only_current)
            + usize::from(!self.user_tag_ids.is_empty())
            + usize::from(self.filter_mode != FilterMode::All)
    }

    pub fn page(&self) -> u32 {
        self.page
    }
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }
    pub fn search(&self) -> &str {
        &self.search
    }
    pub fn include_expired(&self) -> bool {
        self.include_expired
    }
    pub fn only_current(&self) -> bool {
        self.only_current
    }
    pub fn objeto(&self) -> &str {
        &self.objeto
    }
    pub fn agencia(&self) -> &str {
        &self.agencia
    }
    pub fn pais(&self) -> &str {
        &self.pais
    }
    pub fn rubro(&self) -> &str {
        &self.rubro
    }
    pub fn apertura_from(&self) -> &str {
        &self.apertura_from
    }
    pub fn apertura_to(&self) -> &str {
        &self.apertura_to
    }
    pub fn user_tag_ids(&self) -> &[i64] {
        &self.user_tag_ids
    }
    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_page(page: u32) -> SearchFilterState {
        SearchFilterState::default().apply(FilterChange::Page(page))
    }

    #[test]
    fn field_changes_return_to_first_page() {
        let changes = vec![
            FilterChange::Search("puente".into()),
            FilterChange::IncludeExpired(true),
            FilterChange::OnlyCurrent(true),
            FilterChange::Objeto("obra".into()),
            FilterChange::Agencia("MOP".into()),
            FilterChange::Pais("AR".into()),
            FilterChange::Rubro("all".into()),
            FilterChange::AperturaFrom("2024-01-01".into()),
            FilterChange::AperturaTo("2024-02-01".into()),
            FilterChange::UserTagIds(vec![1, 2]),
            FilterChange::FilterMode(FilterMode::UserTags),
        ];
        for change in changes {
            let next = on_page(4).apply(change.clone());
            assert_eq!(next.page(), 1, "{:?} should reset the page", change);
        }
    }

    #[test]
    fn paging_changes_keep_the_page() {
        let state = on_page(3);
        assert_eq!(state.page(), 3);
        let resized = state.apply(FilterChange::PageSize(PageSize::Fifty));
        assert_eq!(resized.page(), 3);
        assert_eq!(resized.page_size(), PageSize::Fifty);
        assert_eq!(state.apply(FilterChange::Page(0)).page(), 1);
    }

    #[test]
    fn change_classes() {
        assert_eq!(FilterChange::Search("x".into()).class(), IntentClass::Text);
        assert_eq!(FilterChange::Page(2).class(), IntentClass::Immediate);
        assert_eq!(
            FilterChange::PageSize(PageSize::Hundred).class(),
            IntentClass::Immediate
        );
        assert_eq!(
            FilterChange::UserTagIds(vec![]).class(),
            IntentClass::Structured
        );
        assert_eq!(
            FilterChange::AperturaTo(String::new()).class(),
            IntentClass::Structured
        );
    }

    #[test]
    fn page_size_only_accepts_known_values() {
        assert_eq!(PageSize::try_from(200).unwrap(), PageSize::TwoHundred);
        assert_eq!(PageSize::try_from(20), Err(ValidationError::PageSize(20)));
    }

    #[test]
    fn active_filters_ignore_sentinels() {
        let state = SearchFilterState::default()
            .apply(FilterChange::Pais("all".into()))
            .apply(FilterChange::Rubro("construccion".into()))
            .apply(FilterChange::IncludeExpired(true));
        assert_eq!(state.active_filter_count(), 2);
        assert_eq!(state.cleared().active_filter_count(), 0);
    }
}
