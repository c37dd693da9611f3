//! Load orchestration: the one place that decides where a workbook comes from.
//!
//! A [`Session`] lives on the interactive thread and owns everything the
//! presentation layer can see. Slow work (cache I/O, origin fetches, parses)
//! runs elsewhere and reports back through the session's inbox; nothing is
//! applied until [`Session::pump`] has checked that the message still carries
//! the current token for its operation class.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::domain::cache_key::{selection_from_sheet_key, sheet_key, source_key};
use crate::domain::entities::source::{DataSource, SheetSelection};
use crate::domain::entities::workbook::{filter_workbook, ParsedSheet, Workbook};
use crate::usecase::ports::cache_backend::{CacheEntry, CacheListing, PersistentCacheBackend};
use crate::usecase::ports::origin::{Credentials, FetchProgress, FetchRequest, OriginFetcher};
use crate::usecase::ports::parser::{ParseError, ParseReply, ParseRequest, SheetParser};
use crate::usecase::services::cache_io::CacheIo;
use crate::usecase::services::coordinator::{OperationClass, RequestCoordinator, RequestToken};
use crate::usecase::services::error::LoadError;
use crate::usecase::services::normalize::NormalizingParser;
use crate::usecase::services::parse_task::{spawn_parse, ParseSlot};
use crate::usecase::services::prefetch::{PrefetchConfig, Prefetcher};
use crate::usecase::services::sheet_cache::ParsedSheetCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub interactive_chunk_rows: usize,
    pub prefetch: PrefetchConfig,
    pub credentials: Option<Credentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interactive_chunk_rows: 5_000,
            prefetch: PrefetchConfig::default(),
            credentials: None,
        }
    }
}

/// A parsed sheet together with the sheet key it was parsed for.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownSheet {
    pub key: String,
    pub data: Arc<ParsedSheet>,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub source: Option<DataSource>,
    pub workbook: Option<Arc<Workbook>>,
    pub file_name: Option<String>,
    pub sheet_names: Vec<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub from_cache: bool,
    pub selection: Option<SheetSelection>,
    /// Only ever holds the sheet named by `selection`; `None` while that
    /// sheet is still being parsed.
    pub parsed: Option<ShownSheet>,
    pub loading: bool,
    pub parsing: bool,
    pub refreshing: bool,
    pub progress: Option<FetchProgress>,
    pub error: Option<LoadError>,
}

impl ViewState {
    pub fn parsed_sheet(&self) -> Option<&ParsedSheet> {
        self.parsed.as_ref().map(|shown| shown.data.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    WorkbookApplied { key: String, from_cache: bool },
    SheetApplied { key: String, from_memory: bool },
    Refreshed { key: String },
    RefreshFailed { reason: String },
    Prefetched { sheet: String },
    Failed(LoadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub backend: &'static str,
    pub total_size: u64,
    /// Entries `load` can return; metadata-only rows are not counted.
    pub entry_count: usize,
    pub backend_path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPurpose {
    Initial,
    Refresh,
}

enum SessionMessage {
    CacheProbed {
        token: RequestToken,
        source: DataSource,
        key: String,
        entry: Option<CacheEntry>,
    },
    FetchProgress {
        token: RequestToken,
        progress: FetchProgress,
    },
    Fetched {
        token: RequestToken,
        source: DataSource,
        key: String,
        purpose: FetchPurpose,
        outcome: Result<Workbook, String>,
    },
    Parsed {
        token: RequestToken,
        generation: u64,
        selection: SheetSelection,
        reply: ParseReply,
    },
    Prefetched {
        generation: u64,
        sheet: String,
        reply: ParseReply,
    },
}

/// How a freshly obtained workbook should be put on screen.
struct Arrival {
    source: DataSource,
    key: String,
    workbook: Workbook,
    file_name: String,
    last_refreshed_at: DateTime<Utc>,
    from_cache: bool,
    preferred: Option<SheetSelection>,
    pre_parsed: Option<(String, ParsedSheet)>,
    keep_visible_sheet: bool,
}

impl Arrival {
    fn fresh(source: DataSource, key: String, workbook: Workbook) -> Self {
        let file_name = source.name.clone();
        Self {
            source,
            key,
            workbook,
            file_name,
            last_refreshed_at: Utc::now(),
            from_cache: false,
            preferred: None,
            pre_parsed: None,
            keep_visible_sheet: false,
        }
    }
}

/// Fetches `request` from the origin.
///
/// With credentials the origin returns exactly the requested subset. Without
/// them it returns the whole workbook, which is filtered here.
pub fn fetch_from_origin(
    fetcher: &dyn OriginFetcher,
    request: &FetchRequest,
    credentials: Option<&Credentials>,
    on_progress: &dyn Fn(FetchProgress),
) -> Result<Workbook> {
    if credentials.is_some() {
        return fetcher.fetch(request, credentials, on_progress);
    }

    let public = FetchRequest {
        sheet_selection: None,
        ..request.clone()
    };
    let workbook = fetcher.fetch(&public, None, on_progress)?;
    Ok(match &request.sheet_selection {
        Some(names) => filter_workbook(&workbook, names),
        None => workbook,
    })
}

/// Load orchestrator with its two cache tiers.
pub struct Session {
    config: SessionConfig,
    backend: Arc<dyn PersistentCacheBackend>,
    fetcher: Arc<dyn OriginFetcher>,
    parser: Arc<dyn SheetParser>,
    cache_io: CacheIo,
    coordinator: RequestCoordinator,
    sheet_cache: ParsedSheetCache,
    prefetcher: Prefetcher,
    interactive: ParseSlot,
    inbox_tx: Sender<SessionMessage>,
    inbox: Receiver<SessionMessage>,
    outbox: Vec<SessionEvent>,
    view: ViewState,
    active_key: Option<String>,
    /// Sheet keys whose parse was already written for this generation.
    persisted_sheets: HashSet<String>,
    generation: u64,
    next_prefetch_id: u64,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn PersistentCacheBackend>,
        fetcher: Arc<dyn OriginFetcher>,
    ) -> Self {
        Self::with_parser(config, backend, fetcher, Arc::new(NormalizingParser))
    }

    pub fn with_parser(
        config: SessionConfig,
        backend: Arc<dyn PersistentCacheBackend>,
        fetcher: Arc<dyn OriginFetcher>,
        parser: Arc<dyn SheetParser>,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::channel();
        let prefetcher = Prefetcher::new(config.prefetch);
        Self {
            cache_io: CacheIo::spawn(backend.clone()),
            config,
            backend,
            fetcher,
            parser,
            coordinator: RequestCoordinator::new(),
            sheet_cache: ParsedSheetCache::new(),
            prefetcher,
            interactive: ParseSlot::default(),
            inbox_tx,
            inbox,
            outbox: Vec::new(),
            view: ViewState::default(),
            active_key: None,
            persisted_sheets: HashSet::new(),
            generation: 0,
            next_prefetch_id: 0,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn sheet_cache(&self) -> &ParsedSheetCache {
        &self.sheet_cache
    }

    /// Starts loading `source`: persistent cache first, origin on a miss.
    ///
    /// Returns immediately; results arrive through [`Session::pump`].
    pub fn load_source(&mut self, source: DataSource) -> RequestToken {
        let token = self.coordinator.begin(OperationClass::Load);
        let key = source_key(&source);
        tracing::debug!(token = token.0, key = %key, source = %source.name, "load requested");

        self.view.loading = true;
        self.view.refreshing = false;
        self.view.progress = None;

        let tx = self.inbox_tx.clone();
        let probe_source = source.clone();
        let probe_key = key.clone();
        let queued = self.cache_io.load(key.clone(), move |entry| {
            let _ = tx.send(SessionMessage::CacheProbed {
                token,
                source: probe_source,
                key: probe_key,
                entry,
            });
        });
        if !queued {
            let _ = self.inbox_tx.send(SessionMessage::CacheProbed {
                token,
                source,
                key,
                entry: None,
            });
        }
        token
    }

    /// Shows a workbook the caller just read from a local file or paste, and
    /// persists it: for local-only sources that copy is the only one there is.
    pub fn load_imported(
        &mut self,
        source: DataSource,
        workbook: Workbook,
    ) -> Result<RequestToken, LoadError> {
        if workbook.is_empty() {
            return Err(LoadError::SourceUnavailable {
                source_name: source.name.clone(),
                reason: "imported file contains no sheets".to_string(),
            });
        }

        let token = self.coordinator.begin(OperationClass::Load);
        let key = source_key(&source);
        self.apply_workbook(Arrival::fresh(source, key, workbook));
        self.persist_active_workbook();
        Ok(token)
    }

    /// Switches the visible sheet (or merged set of sheets) of the active workbook.
    pub fn switch_sheet(&mut self, selection: SheetSelection) -> Result<RequestToken, LoadError> {
        let Some(workbook) = self.view.workbook.clone() else {
            return Err(LoadError::NoActiveWorkbook);
        };
        let names = selection.sheet_names();
        if names.is_empty() {
            return Err(LoadError::UnknownSheet {
                sheet: String::new(),
            });
        }
        if let Some(missing) = names.into_iter().find(|name| !workbook.contains(name)) {
            return Err(LoadError::UnknownSheet {
                sheet: missing.to_string(),
            });
        }
        Ok(self.select(selection))
    }

    /// Drains finished background work and applies whatever is still current.
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        while let Ok(message) = self.inbox.try_recv() {
            self.handle(message);
        }
        std::mem::take(&mut self.outbox)
    }

    /// Like [`Session::pump`], but waits up to `timeout` for the first message
    /// when nothing is pending yet.
    pub fn pump_timeout(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        if self.outbox.is_empty() {
            if let Ok(message) = self.inbox.recv_timeout(timeout) {
                self.handle(message);
            }
        }
        self.pump()
    }

    /// Idle hook: starts at most one background sibling parse.
    ///
    /// Returns `true` if a prefetch step was started.
    pub fn run_idle(&mut self) -> bool {
        if self.interactive.is_busy() || self.prefetcher.is_busy() {
            return false;
        }
        if self.prefetcher.generation() != self.generation {
            return false;
        }
        let Some(workbook) = self.view.workbook.clone() else {
            return false;
        };
        let Some(sheet) = self.prefetcher.next_candidate(&self.sheet_cache) else {
            return false;
        };

        self.next_prefetch_id += 1;
        let generation = self.generation;
        let request = ParseRequest {
            id: self.next_prefetch_id,
            selection: SheetSelection::Single(sheet.clone()),
            workbook,
            chunk_rows: self.prefetcher.config().chunk_rows,
        };
        let reply_sheet = sheet.clone();
        match spawn_parse(
            self.parser.clone(),
            request,
            self.inbox_tx.clone(),
            move |reply| SessionMessage::Prefetched {
                generation,
                sheet: reply_sheet,
                reply,
            },
        ) {
            Ok(handle) => {
                tracing::debug!(sheet = %sheet, "prefetching sibling sheet");
                self.prefetcher.start(sheet, handle);
                true
            }
            Err(err) => {
                tracing::warn!(sheet = %sheet, error = %err, "failed to start prefetch");
                false
            }
        }
    }

    pub fn is_prefetch_idle(&self) -> bool {
        !self.prefetcher.is_busy() && self.prefetcher.pending() == 0
    }

    /// Read-only diagnostics over the persistent tier.
    pub fn cache_stats(&self) -> CacheStats {
        let stats = self.backend.stats();
        CacheStats {
            backend: self.backend.name(),
            total_size: stats.total_size,
            entry_count: self
                .cache_listing()
                .iter()
                .filter(|item| item.loadable)
                .count(),
            backend_path: stats.backend_path,
        }
    }

    pub fn cache_listing(&self) -> Vec<CacheListing> {
        self.backend.list()
    }

    /// Removes the persisted copy of `source`; clears the view if it is the active one.
    pub fn forget_source(&mut self, source: &DataSource) {
        let key = source_key(source);
        self.cache_io.remove(key.clone());

        if self.active_key.as_deref() == Some(key.as_str()) {
            self.coordinator.begin(OperationClass::Load);
            self.coordinator.begin(OperationClass::Parse);
            self.generation += 1;
            self.sheet_cache.clear();
            self.prefetcher.reset(self.generation);
            self.interactive.cancel();
            self.active_key = None;
            self.persisted_sheets.clear();
            self.view = ViewState::default();
        }
    }

    /// Waits for queued cache writes; used on shutdown and in tests.
    pub fn flush_cache_writes(&self, timeout: Duration) -> bool {
        self.cache_io.flush(timeout)
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::CacheProbed {
                token,
                source,
                key,
                entry,
            } => self.on_cache_probed(token, source, key, entry),
            SessionMessage::FetchProgress { token, progress } => {
                if self.coordinator.is_current(OperationClass::Load, token) {
                    self.view.progress = Some(progress);
                }
            }
            SessionMessage::Fetched {
                token,
                source,
                key,
                purpose,
                outcome,
            } => self.on_fetched(token, source, key, purpose, outcome),
            SessionMessage::Parsed {
                token,
                generation,
                selection,
                reply,
            } => self.on_parsed(token, generation, selection, reply),
            SessionMessage::Prefetched {
                generation,
                sheet,
                reply,
            } => self.on_prefetched(generation, sheet, reply),
        }
    }

    fn on_cache_probed(
        &mut self,
        token: RequestToken,
        source: DataSource,
        key: String,
        entry: Option<CacheEntry>,
    ) {
        if !self.coordinator.is_current(OperationClass::Load, token) {
            tracing::debug!(token = token.0, key = %key, "stale cache probe dropped");
            return;
        }

        match entry.filter(|entry| !entry.workbook.is_empty()) {
            Some(entry) => {
                tracing::debug!(key = %key, "serving workbook from persistent cache");
                let preferred = entry
                    .parsed_cache_key
                    .as_deref()
                    .and_then(selection_from_sheet_key)
                    .or_else(|| Some(SheetSelection::Single(entry.active_sheet_name.clone())));
                let pre_parsed = match (entry.needs_reparse, entry.parsed_cache_key, entry.parsed_data) {
                    (false, Some(parsed_key), Some(parsed)) => Some((parsed_key, parsed)),
                    _ => None,
                };
                let refresh = source.kind.has_origin();
                let refresh_source = source.clone();

                self.apply_workbook(Arrival {
                    source,
                    key: key.clone(),
                    workbook: entry.workbook,
                    file_name: entry.file_name,
                    last_refreshed_at: entry.last_refreshed_at,
                    from_cache: true,
                    preferred,
                    pre_parsed,
                    keep_visible_sheet: false,
                });

                if refresh {
                    let refresh_token = self.coordinator.begin(OperationClass::Load);
                    self.view.refreshing = true;
                    self.spawn_fetch(refresh_token, refresh_source, key, FetchPurpose::Refresh);
                }
            }
            None if source.kind.has_origin() => {
                tracing::debug!(key = %key, "cache miss; fetching from origin");
                self.spawn_fetch(token, source, key, FetchPurpose::Initial);
            }
            None => {
                self.view.loading = false;
                self.fail(LoadError::CacheMissNoOrigin {
                    source_name: source.name,
                });
            }
        }
    }

    fn on_fetched(
        &mut self,
        token: RequestToken,
        source: DataSource,
        key: String,
        purpose: FetchPurpose,
        outcome: Result<Workbook, String>,
    ) {
        if !self.coordinator.is_current(OperationClass::Load, token) {
            tracing::debug!(token = token.0, key = %key, "stale origin result dropped");
            return;
        }
        self.view.progress = None;

        let outcome = outcome.and_then(|workbook| {
            if workbook.is_empty() {
                Err("origin returned no sheets".to_string())
            } else {
                Ok(workbook)
            }
        });

        match (purpose, outcome) {
            (FetchPurpose::Initial, Ok(workbook)) => {
                self.apply_workbook(Arrival::fresh(source, key, workbook));
                self.persist_active_workbook();
            }
            (FetchPurpose::Initial, Err(reason)) => {
                self.view.loading = false;
                self.fail(LoadError::SourceUnavailable {
                    source_name: source.name,
                    reason,
                });
            }
            (FetchPurpose::Refresh, Ok(workbook)) => {
                self.apply_workbook(Arrival {
                    preferred: self.view.selection.clone(),
                    keep_visible_sheet: true,
                    ..Arrival::fresh(source, key.clone(), workbook)
                });
                self.persist_active_workbook();
                self.outbox.push(SessionEvent::Refreshed { key });
            }
            (FetchPurpose::Refresh, Err(reason)) => {
                tracing::warn!(key = %key, reason = %reason, "background refresh failed; keeping cached copy");
                self.view.refreshing = false;
                self.outbox.push(SessionEvent::RefreshFailed { reason });
            }
        }
    }

    fn on_parsed(
        &mut self,
        token: RequestToken,
        generation: u64,
        selection: SheetSelection,
        reply: ParseReply,
    ) {
        self.interactive.finish(reply.id);
        if generation != self.generation
            || !self.coordinator.is_current(OperationClass::Parse, token)
        {
            tracing::debug!(token = token.0, sheet = %selection.label(), "stale parse result dropped");
            return;
        }
        self.view.parsing = false;

        match reply.outcome {
            Ok(parsed) => {
                let key = sheet_key(&selection);
                let parsed = Arc::new(parsed);
                self.sheet_cache.put(key.clone(), parsed.clone());
                self.view.parsed = Some(ShownSheet {
                    key: key.clone(),
                    data: parsed.clone(),
                });
                self.view.error = None;
                self.outbox.push(SessionEvent::SheetApplied {
                    key,
                    from_memory: false,
                });
                self.after_sheet_ready(&selection, &parsed);
            }
            Err(err) => {
                self.view.parsed = None;
                self.fail(LoadError::ParseFailure {
                    sheet: selection.label(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn on_prefetched(&mut self, generation: u64, sheet: String, reply: ParseReply) {
        self.prefetcher.complete(reply.id);
        if generation != self.generation {
            tracing::debug!(sheet = %sheet, "prefetch for replaced workbook dropped");
            return;
        }

        match reply.outcome {
            Ok(parsed) => {
                let key = sheet_key(&SheetSelection::Single(sheet.clone()));
                if !self.sheet_cache.contains(&key) {
                    self.sheet_cache.put(key, Arc::new(parsed));
                }
                self.outbox.push(SessionEvent::Prefetched { sheet });
            }
            Err(ParseError::Cancelled) => {}
            Err(err) => {
                tracing::debug!(sheet = %sheet, error = %err, "prefetch failed");
            }
        }
    }

    /// Replaces the active workbook. The parsed-sheet cache is wiped before
    /// anything else touches it, then the preferred selection is shown.
    fn apply_workbook(&mut self, arrival: Arrival) {
        let workbook = Arc::new(arrival.workbook);
        self.generation += 1;
        self.sheet_cache.clear();
        self.prefetcher.reset(self.generation);
        self.interactive.cancel();
        self.persisted_sheets.clear();

        let selection = arrival
            .preferred
            .filter(|selection| {
                let names = selection.sheet_names();
                !names.is_empty() && names.iter().all(|name| workbook.contains(name))
            })
            .or_else(|| {
                workbook
                    .sheets
                    .first()
                    .map(|sheet| SheetSelection::Single(sheet.name.clone()))
            });

        if let (Some(selection), Some((parsed_key, parsed))) = (&selection, arrival.pre_parsed) {
            if sheet_key(selection) == parsed_key {
                self.sheet_cache.put(parsed_key.clone(), Arc::new(parsed));
                // Already on disk with this parse; no need to write it back.
                self.persisted_sheets.insert(parsed_key);
            }
        }

        self.active_key = Some(arrival.key.clone());
        self.view.source = Some(arrival.source);
        self.view.sheet_names = workbook.sheet_names();
        self.view.workbook = Some(workbook);
        self.view.file_name = Some(arrival.file_name);
        self.view.last_refreshed_at = Some(arrival.last_refreshed_at);
        self.view.from_cache = arrival.from_cache;
        self.view.loading = false;
        self.view.refreshing = false;
        self.view.progress = None;
        self.view.error = None;
        // A kept sheet survives only if `select` below picks the same key.
        if !arrival.keep_visible_sheet {
            self.view.parsed = None;
        }

        self.outbox.push(SessionEvent::WorkbookApplied {
            key: arrival.key,
            from_cache: arrival.from_cache,
        });

        if let Some(selection) = selection {
            self.select(selection);
        }
    }

    fn select(&mut self, selection: SheetSelection) -> RequestToken {
        let token = self.coordinator.begin(OperationClass::Parse);
        let key = sheet_key(&selection);
        self.view.selection = Some(selection.clone());

        if let Some(parsed) = self.sheet_cache.get(&key) {
            self.interactive.cancel();
            self.view.parsing = false;
            self.view.parsed = Some(ShownSheet {
                key: key.clone(),
                data: parsed.clone(),
            });
            self.view.error = None;
            self.outbox.push(SessionEvent::SheetApplied {
                key,
                from_memory: true,
            });
            self.after_sheet_ready(&selection, &parsed);
            return token;
        }

        if self
            .view
            .parsed
            .as_ref()
            .is_some_and(|shown| shown.key != key)
        {
            self.view.parsed = None;
        }
        let Some(workbook) = self.view.workbook.clone() else {
            return token;
        };
        self.view.parsing = true;
        let generation = self.generation;
        let request = ParseRequest {
            id: token.0,
            selection: selection.clone(),
            workbook,
            chunk_rows: self.config.interactive_chunk_rows,
        };
        let reply_selection = selection.clone();
        match spawn_parse(
            self.parser.clone(),
            request,
            self.inbox_tx.clone(),
            move |reply| SessionMessage::Parsed {
                token,
                generation,
                selection: reply_selection,
                reply,
            },
        ) {
            Ok(handle) => self.interactive.start(handle),
            Err(err) => {
                self.interactive.cancel();
                self.view.parsing = false;
                self.view.parsed = None;
                self.fail(LoadError::ParseFailure {
                    sheet: selection.label(),
                    reason: format!("{err:#}"),
                });
            }
        }
        token
    }

    /// Persists the active sheet's parse alongside the workbook, once per sheet
    /// and workbook generation, and plans the background walk over its siblings.
    fn after_sheet_ready(&mut self, selection: &SheetSelection, parsed: &Arc<ParsedSheet>) {
        let key = sheet_key(selection);
        if !self.persisted_sheets.contains(&key) {
            self.persist_active_sheet(selection, &key, parsed);
        }

        let Some(workbook) = self.view.workbook.clone() else {
            return;
        };
        match self
            .prefetcher
            .schedule(self.generation, &workbook, selection, parsed)
        {
            Ok(queued) => tracing::debug!(queued, "prefetch planned"),
            Err(skip) => tracing::debug!(?skip, "prefetch skipped"),
        }
    }

    fn persist_active_workbook(&mut self) {
        let (Some(key), Some(workbook)) = (self.active_key.clone(), self.view.workbook.clone())
        else {
            return;
        };
        let file_name = self.view.file_name.clone().unwrap_or_default();
        let active_sheet = self.active_sheet_name();
        let last_refreshed_at = self.view.last_refreshed_at.unwrap_or_else(Utc::now);

        self.cache_io.save_with(key, move || {
            let mut entry = CacheEntry::new((*workbook).clone(), file_name, active_sheet);
            entry.last_refreshed_at = last_refreshed_at;
            entry
        });
    }

    fn persist_active_sheet(&mut self, selection: &SheetSelection, key: &str, parsed: &Arc<ParsedSheet>) {
        let (Some(entry_key), Some(workbook)) =
            (self.active_key.clone(), self.view.workbook.clone())
        else {
            return;
        };
        let file_name = self.view.file_name.clone().unwrap_or_default();
        let active_sheet = selection
            .sheet_names()
            .first()
            .map(|name| name.to_string())
            .unwrap_or_default();
        let last_refreshed_at = self.view.last_refreshed_at.unwrap_or_else(Utc::now);
        let parsed_key = key.to_string();
        let parsed = parsed.clone();

        self.persisted_sheets.insert(parsed_key.clone());
        self.cache_io.save_with(entry_key, move || {
            let mut entry = CacheEntry::new((*workbook).clone(), file_name, active_sheet)
                .with_parsed(parsed_key, (*parsed).clone());
            entry.last_refreshed_at = last_refreshed_at;
            entry
        });
    }

    fn active_sheet_name(&self) -> String {
        self.view
            .selection
            .as_ref()
            .and_then(|selection| selection.sheet_names().first().map(|name| name.to_string()))
            .unwrap_or_default()
    }

    fn spawn_fetch(&self, token: RequestToken, source: DataSource, key: String, purpose: FetchPurpose) {
        let fetcher = self.fetcher.clone();
        let credentials = self.config.credentials.clone();
        let tx = self.inbox_tx.clone();
        let fallback_tx = self.inbox_tx.clone();
        let fallback_source = source.clone();
        let fallback_key = key.clone();

        let spawned = thread::Builder::new()
            .name(format!("origin-fetch-{}", token.0))
            .spawn(move || {
                let request = FetchRequest::for_source(&source);
                let progress_tx = tx.clone();
                let on_progress = move |progress: FetchProgress| {
                    let _ = progress_tx.send(SessionMessage::FetchProgress { token, progress });
                };
                let outcome =
                    fetch_from_origin(fetcher.as_ref(), &request, credentials.as_ref(), &on_progress)
                        .map_err(|err| format!("{err:#}"));
                if let Err(reason) = &outcome {
                    tracing::warn!(url = %request.url, reason = %reason, "origin fetch failed");
                }
                let _ = tx.send(SessionMessage::Fetched {
                    token,
                    source,
                    key,
                    purpose,
                    outcome,
                });
            });

        if let Err(err) = spawned {
            let _ = fallback_tx.send(SessionMessage::Fetched {
                token,
                source: fallback_source,
                key: fallback_key,
                purpose,
                outcome: Err(format!("failed to start origin fetch: {err}")),
            });
        }
    }

    fn fail(&mut self, error: LoadError) {
        tracing::warn!(error = %error, "load failed");
        self.view.error = Some(error.clone());
        self.outbox.push(SessionEvent::Failed(error));
    }
}
