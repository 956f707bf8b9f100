//! Result page store.
//!
//! Holds the last successfully applied [`SearchResultPage`] together with
//! the filter state that produced it, and hands out a [`RequestTicket`] for
//! every request. A response is only applied while its ticket is the newest
//! one issued, so a slow early response can never overwrite a later one.

use crate::filters::{PageSize, SearchFilterState};
use crate::models::SearchResultPage;

/// Proof that a request was issued, carrying its sequence number and the
/// filter state it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    seq: u64,
    filters: SearchFilterState,
}

impl RequestTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn filters(&self) -> &SearchFilterState {
        &self.filters
    }
}

/// What happened to a response handed to [`ResultPageStore::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Applied,
    /// A newer request was issued; the response was dropped.
    Superseded,
}

#[derive(Debug, Default)]
pub struct ResultPageStore {
    issued: u64,
    page: Option<SearchResultPage>,
    filters: Option<SearchFilterState>,
}

impl ResultPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new request; every earlier ticket becomes stale.
    pub fn issue(&mut self, filters: SearchFilterState) -> RequestTicket {
        self.issued += 1;
        RequestTicket {
            seq: self.issued,
            filters,
        }
    }

    pub fn is_latest(&self, ticket: &RequestTicket) -> bool {
        ticket.seq == self.issued
    }

    /// Applies `page` if `ticket` is still the newest request.
    pub fn settle(&mut self, ticket: RequestTicket, page: SearchResultPage) -> Settled {
        if !self.is_latest(&ticket) {
            return Settled::Superseded;
        }
        self.page = Some(page);
        self.filters = Some(ticket.filters);
        Settled::Applied
    }

    /// Forgets the last page. Outstanding tickets stay valid.
    pub fn reset(&mut self) {
        self.page = None;
        self.filters = None;
    }

    /// Last applied page, whatever filters produced it.
    pub fn last_page(&self) -> Option<&SearchResultPage> {
        self.page.as_ref()
    }

    /// Filter state that produced [`last_page`](Self::last_page).
    pub fn last_filters(&self) -> Option<&SearchFilterState> {
        self.filters.as_ref()
    }

    /// The last page, if it answered the same query as `filters` at the
    /// same page size. The page number itself is ignored.
    pub fn page_for(&self, filters: &SearchFilterState) -> Option<&SearchResultPage> {
        match (&self.page, &self.filters) {
            (Some(page), Some(f)) if f.with_page(1) == filters.with_page(1) => Some(page),
            _ => None,
        }
    }

    /// Number of requests issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Clamps `page` to `[1, paginas]` of the last result for the query in
    /// `filters`.
    ///
    /// When the last result came from another query only the lower bound
    /// applies.
    pub fn clamp_page(&self, page: u32, filters: &SearchFilterState) -> u32 {
        match self.page_for(filters) {
            Some(p) => clamp_page(page, p.paginas),
            None => page.max(1),
        }
    }

    /// Clamps the page of `filters` against the page count `page_size` would
    /// give the last known total for the same query.
    pub fn clamp_page_for_size(&self, filters: &SearchFilterState, page_size: PageSize) -> u32 {
        match self.page_for(filters) {
            Some(p) => clamp_page(filters.page(), page_count(p.total, page_size)),
            None => filters.page().max(1),
        }
    }
}

/// Clamps `page` to `[1, paginas]`; a zero page count counts as one page.
pub fn clamp_page(page: u32, paginas: u32) -> u32 {
    page.clamp(1, paginas.max(1))
}

/// Number of pages needed for `total` rows, at least one.
pub fn page_count(total: u64, page_size: PageSize) -> u32 {
    let size = u64::from(page_size.get());
    let pages = total.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}
