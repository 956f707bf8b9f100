//! Search controller.
//!
//! A spawned task owns the filter state, the [`ResultPageStore`] and the
//! [`DebounceScheduler`]. Callers talk to it through a [`SearchHandle`]:
//! typed [`SearchCommand`]s go in over a channel, [`SearchView`] snapshots
//! come out over a `watch` channel.
//!
//! Each [`FilterChange`] is classified once ([`FilterChange::class`]) and the
//! dispatcher picks the policy: text edits wait for the text quiet period,
//! structured filters for the shorter filter quiet period, paging goes out
//! at once. Every dispatched request gets a ticket from the store and its
//! response is applied only if no newer request was issued in between.
//!
//! Dropping the handle (or calling [`SearchHandle::shutdown`]) cancels the
//! task together with every pending debounce deadline and in-flight request.

use std::sync::Arc;

use anyhow::{bail, Result};
use indexer_console_core::query::{build_search_request, from_wire_date, parse_tag_ids};
use indexer_console_core::results::{RequestTicket, ResultPageStore};
use indexer_console_core::{
    FilterChange, FilterMode, PageSize, SearchFilterState, SearchResultPage,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::IndexerApi;
use crate::config::SearchConfig;
use crate::debounce::{DebouncePolicy, DebounceScheduler};
use crate::error::ApiError;
use crate::progress::format_number;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchCommand {
    Change(FilterChange),
    /// Back to default filters (keeping the page size) and forget results.
    Clear,
    /// Re-run the current filters now.
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Searching,
    Settled,
    Errored { message: String, status: Option<u16> },
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchView {
    /// Current filters, possibly not dispatched yet.
    pub filters: SearchFilterState,
    pub phase: SearchPhase,
    /// Last successfully applied page. Kept across errors.
    pub results: Option<SearchResultPage>,
    /// Filters that produced `results`.
    pub results_filters: Option<SearchFilterState>,
    /// A debounced search is waiting for its quiet period.
    pub pending: bool,
    pub requests_issued: u64,
    /// Sequence number of the newest request whose response was handled.
    pub settled_seq: u64,
}

impl SearchView {
    fn new(filters: SearchFilterState) -> Self {
        Self {
            filters,
            phase: SearchPhase::Idle,
            results: None,
            results_filters: None,
            pending: false,
            requests_issued: 0,
            settled_seq: 0,
        }
    }

    /// The newest request has been answered and nothing is waiting.
    pub fn is_quiescent(&self) -> bool {
        !self.pending && self.requests_issued > 0 && self.settled_seq == self.requests_issued
    }
}

type SearchOutcome = (RequestTicket, Result<SearchResultPage, ApiError>);

struct SearchController {
    api: Arc<dyn IndexerApi>,
    filters: SearchFilterState,
    store: ResultPageStore,
    scheduler: DebounceScheduler,
    in_flight: JoinSet<SearchOutcome>,
    phase: SearchPhase,
    settled_seq: u64,
    view_tx: watch::Sender<SearchView>,
}

impl SearchController {
    /// Starts a controller and issues the first search for `initial`.
    fn spawn(
        api: Arc<dyn IndexerApi>,
        initial: SearchFilterState,
        policy: DebouncePolicy,
    ) -> SearchHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SearchView::new(initial.clone()));
        let cancel = CancellationToken::new();

        let controller = SearchController {
            api,
            filters: initial,
            store: ResultPageStore::new(),
            scheduler: DebounceScheduler::new(policy),
            in_flight: JoinSet::new(),
            phase: SearchPhase::Idle,
            settled_seq: 0,
            view_tx,
        };
        let task = tokio::spawn(controller.run(command_rx, cancel.clone()));

        SearchHandle {
            commands: command_tx,
            view: view_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SearchCommand>,
        cancel: CancellationToken,
    ) {
        debug!("search controller started");
        self.dispatch();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.on_response(joined);
                }
                class = self.scheduler.next_due() => {
                    debug!(?class, "quiet period elapsed");
                    self.dispatch();
                }
            }
        }

        self.scheduler.cancel_all();
        self.in_flight.abort_all();
        info!(requests = self.store.issued(), "search controller stopped");
    }

    fn handle(&mut self, command: SearchCommand) {
        match command {
            SearchCommand::Change(change) => {
                let class = DebouncePolicy::class_for(change.class());
                self.filters = self.apply_change(change);
                match class {
                    Some(class) => {
                        self.scheduler.schedule(class);
                        self.publish();
                    }
                    None => self.dispatch(),
                }
            }
            SearchCommand::Clear => {
                self.filters = self.filters.cleared();
                self.store.reset();
                self.dispatch();
            }
            SearchCommand::Refresh => self.dispatch(),
        }
    }

    /// Applies `change`, clamping paging against the last result for the
    /// current query.
    fn apply_change(&self, change: FilterChange) -> SearchFilterState {
        match change {
            FilterChange::Page(page) => self
                .filters
                .apply(FilterChange::Page(self.store.clamp_page(page, &self.filters))),
            FilterChange::PageSize(size) => {
                let page = self.store.clamp_page_for_size(&self.filters, size);
                self.filters
                    .apply(FilterChange::PageSize(size))
                    .with_page(page)
            }
            other => self.filters.apply(other),
        }
    }

    fn dispatch(&mut self) {
        // Whatever was waiting is covered by this request.
        self.scheduler.cancel_all();

        let ticket = self.store.issue(self.filters.clone());
        let request = build_search_request(&self.filters);
        debug!(
            seq = ticket.seq(),
            page = request.page,
            page_size = request.page_size,
            "dispatching search"
        );
        let api = self.api.clone();
        self.in_flight.spawn(async move {
            let result = api.search(&request).await;
            (ticket, result)
        });
        self.phase = SearchPhase::Searching;
        self.publish();
    }

    fn on_response(&mut self, joined: Result<SearchOutcome, JoinError>) {
        let (ticket, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_panic() {
                    warn!("search request task panicked");
                }
                return;
            }
        };
        if !self.store.is_latest(&ticket) {
            debug!(seq = ticket.seq(), "dropping superseded search response");
            return;
        }
        self.settled_seq = ticket.seq();
        match result {
            Ok(page) => {
                debug!(seq = ticket.seq(), total = page.total, "search settled");
                self.store.settle(ticket, page);
                self.phase = SearchPhase::Settled;
            }
            Err(e) => {
                warn!(seq = ticket.seq(), "search failed: {}", e);
                self.phase = SearchPhase::Errored {
                    message: e.search_message(),
                    status: e.status(),
                };
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(SearchView {
            filters: self.filters.clone(),
            phase: self.phase.clone(),
            results: self.store.last_page().cloned(),
            results_filters: self.store.last_filters().cloned(),
            pending: self.scheduler.has_pending(),
            requests_issued: self.store.issued(),
            settled_seq: self.settled_seq,
        });
    }
}

/// Owner of a running search controller.
pub struct SearchHandle {
    commands: mpsc::UnboundedSender<SearchCommand>,
    view: watch::Receiver<SearchView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SearchHandle {
    pub fn spawn(
        api: Arc<dyn IndexerApi>,
        initial: SearchFilterState,
        policy: DebouncePolicy,
    ) -> SearchHandle {
        SearchController::spawn(api, initial, policy)
    }

    /// Queues a command. Returns `false` once the controller has stopped.
    pub fn send(&self, command: SearchCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn change(&self, change: FilterChange) -> bool {
        self.send(SearchCommand::Change(change))
    }

    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.clone()
    }

    /// Waits until the newest request has been answered and no debounced
    /// search is pending.
    pub async fn settled(&mut self) -> SearchView {
        if let Ok(view) = self.view.wait_for(SearchView::is_quiescent).await {
            return (*view).clone();
        }
        self.view.borrow().clone()
    }

    /// Stops the controller and waits for its task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Filters given on the `ixc search` command line.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub text: Option<String>,
    pub objeto: Option<String>,
    pub agencia: Option<String>,
    pub pais: Option<String>,
    pub rubro: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub tags: Option<String>,
    pub mode: Option<FilterMode>,
    pub include_expired: bool,
    pub only_current: bool,
    pub page: Option<u32>,
    pub page_size: Option<PageSize>,
}

impl SearchOptions {
    /// Filter state these options describe, on top of `default_size`.
    pub fn to_filters(&self, default_size: PageSize) -> SearchFilterState {
        let mut changes = Vec::new();
        let text_fields = [
            (&self.text, FilterChange::Search as fn(String) -> FilterChange),
            (&self.objeto, FilterChange::Objeto),
            (&self.agencia, FilterChange::Agencia),
            (&self.pais, FilterChange::Pais),
            (&self.rubro, FilterChange::Rubro),
        ];
        for (value, change) in text_fields {
            if let Some(value) = value {
                changes.push(change(value.clone()));
            }
        }
        if let Some(from) = &self.from {
            changes.push(FilterChange::AperturaFrom(from_wire_date(from)));
        }
        if let Some(to) = &self.to {
            changes.push(FilterChange::AperturaTo(from_wire_date(to)));
        }
        if let Some(tags) = &self.tags {
            changes.push(FilterChange::UserTagIds(parse_tag_ids(tags)));
        }
        if let Some(mode) = self.mode {
            changes.push(FilterChange::FilterMode(mode));
        }
        changes.push(FilterChange::IncludeExpired(self.include_expired));
        changes.push(FilterChange::OnlyCurrent(self.only_current));

        let filters = changes.into_iter().fold(
            SearchFilterState::new(self.page_size.unwrap_or(default_size)),
            |state, change| state.apply(change),
        );
        match self.page {
            Some(page) => filters.with_page(page),
            None => filters,
        }
    }
}

/// Runs one search and prints the page.
pub async fn run_search(
    api: Arc<dyn IndexerApi>,
    options: &SearchOptions,
    config: &SearchConfig,
    json: bool,
) -> Result<()> {
    let filters = options.to_filters(config.page_size());
    let mut handle = SearchHandle::spawn(api, filters, DebouncePolicy::from_config(config));
    let view = handle.settled().await;
    handle.shutdown().await;

    if let SearchPhase::Errored { message, status } = &view.phase {
        if *status == Some(401) {
            return Err(ApiError::Unauthorized { detail: None }.into());
        }
        bail!("{}", message);
    }
    if let Some(page) = &view.results {
        print_page(page, &view.filters, json);
    }
    Ok(())
}

/// What one line typed into an interactive search session asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveInput {
    Command(SearchCommand),
    Show,
    Help,
    Quit,
}

/// Parses one interactive line against the current `filters`.
pub fn parse_interactive(
    line: &str,
    filters: &SearchFilterState,
) -> Result<InteractiveInput, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let change = |c: FilterChange| Ok(InteractiveInput::Command(SearchCommand::Change(c)));

    match word {
        "" | "show" => Ok(InteractiveInput::Show),
        "help" | "?" => Ok(InteractiveInput::Help),
        "quit" | "exit" | "q" => Ok(InteractiveInput::Quit),
        "clear" => Ok(InteractiveInput::Command(SearchCommand::Clear)),
        "refresh" => Ok(InteractiveInput::Command(SearchCommand::Refresh)),
        "text" | "search" => change(FilterChange::Search(rest.to_string())),
        "objeto" => change(FilterChange::Objeto(rest.to_string())),
        "agencia" => change(FilterChange::Agencia(rest.to_string())),
        "pais" => change(FilterChange::Pais(rest.to_string())),
        "rubro" => change(FilterChange::Rubro(rest.to_string())),
        "from" => change(FilterChange::AperturaFrom(from_wire_date(rest))),
        "to" => change(FilterChange::AperturaTo(from_wire_date(rest))),
        "tags" => change(FilterChange::UserTagIds(parse_tag_ids(rest))),
        "mode" => change(FilterChange::FilterMode(rest.parse::<FilterMode>()?)),
        "expired" => change(FilterChange::IncludeExpired(parse_switch(rest)?)),
        "current" => change(FilterChange::OnlyCurrent(parse_switch(rest)?)),
        "page" => {
            let page = rest
                .parse::<u32>()
                .map_err(|_| format!("page must be a number, got '{}'", rest))?;
            change(FilterChange::Page(page))
        }
        "size" => {
            let size = rest
                .parse::<u32>()
                .map_err(|_| format!("size must be a number, got '{}'", rest))?;
            let size = PageSize::try_from(size).map_err(|e| e.to_string())?;
            change(FilterChange::PageSize(size))
        }
        "next" | "n" => change(FilterChange::Page(filters.page().saturating_add(1))),
        "prev" | "p" => change(FilterChange::Page(filters.page().saturating_sub(1).max(1))),
        other => Err(format!("unknown command '{}', type 'help'", other)),
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "yes" | "1" | "true" => Ok(true),
        "off" | "no" | "0" | "false" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

const INTERACTIVE_HELP: &str = "\
commands:
  text <words>          free-text search (empty clears)
  objeto|agencia|pais|rubro <value>
  from|to <date>        apertura range, YYYY-MM-DD or DD/MM/YYYY
  tags <id,id,...>      user tag ids
  mode all|user_tags
  expired on|off        include expired publications
  current on|off        only current publications
  page <n> | next | prev
  size 15|50|100|200
  clear | refresh | show | quit";

/// Line-driven search session on stdin.
///
/// Each settled page is printed once; edits typed in quick succession are
/// coalesced by the controller's debounce policy.
pub async fn run_interactive(
    api: Arc<dyn IndexerApi>,
    options: &SearchOptions,
    config: &SearchConfig,
    json: bool,
) -> Result<()> {
    let filters = options.to_filters(config.page_size());
    let handle = SearchHandle::spawn(api, filters, DebouncePolicy::from_config(config));
    let mut views = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;

    eprintln!("{}", INTERACTIVE_HELP);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_interactive(&line, &handle.view().filters) {
                    Ok(InteractiveInput::Quit) => break,
                    Ok(InteractiveInput::Help) => eprintln!("{}", INTERACTIVE_HELP),
                    Ok(InteractiveInput::Show) => render_view(&handle.view(), json),
                    Ok(InteractiveInput::Command(command)) => {
                        if !handle.send(command) {
                            break;
                        }
                    }
                    Err(message) => eprintln!("{}", message),
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if view.is_quiescent() && view.settled_seq != printed {
                    printed = view.settled_seq;
                    if let SearchPhase::Errored { status: Some(401), .. } = view.phase {
                        handle.shutdown().await;
                        return Err(ApiError::Unauthorized { detail: None }.into());
                    }
                    render_view(&view, json);
                }
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

fn render_view(view: &SearchView, json: bool) {
    if let SearchPhase::Errored { message, .. } = &view.phase {
        eprintln!("search failed: {}", message);
    }
    match (&view.results, &view.results_filters) {
        (Some(page), Some(filters)) => print_page(page, filters, json),
        _ if matches!(view.phase, SearchPhase::Errored { .. }) => {}
        _ => println!("No results yet."),
    }
}

fn print_page(page: &SearchResultPage, filters: &SearchFilterState, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(page) {
            println!("{}", line);
        }
        return;
    }
    if page.is_empty() {
        println!("No results.");
        return;
    }
    println!(
        "{} results, page {} of {} ({} per page, {} filters active)",
        format_number(page.total),
        page.pagina,
        page.paginas,
        filters.page_size(),
        filters.active_filter_count()
    );
    for publication in &page.publicaciones {
        println!("#{}  {}", publication.id, publication.objeto.trim());
        let mut details = vec![publication.agencia.clone(), publication.pais.clone()];
        if let Some(apertura) = &publication.apertura {
            details.push(format!("apertura {}", apertura));
        }
        details.push(if publication.vigente { "vigente" } else { "vencida" }.to_string());
        details.retain(|d| !d.is_empty());
        println!("    {}", details.join(" | "));
        if !publication.tags.is_empty() {
            let tags: Vec<&str> = publication
                .tags
                .iter()
                .map(|t| t.descripcion.as_str())
                .collect();
            println!("    tags: {}", tags.join(", "));
        }
    }
}
