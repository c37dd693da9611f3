use std::collections::VecDeque;

use crate::domain::cache_key::sheet_key;
use crate::domain::entities::source::SheetSelection;
use crate::domain::entities::workbook::{ParsedSheet, Workbook};
use crate::usecase::services::parse_task::{ParseSlot, ParseTaskHandle};
use crate::usecase::services::sheet_cache::ParsedSheetCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub max_rows: usize,
    pub max_cells: usize,
    /// Rows per chunk for background parses; smaller than interactive parses.
    pub chunk_rows: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_rows: 20_000,
            max_cells: 400_000,
            chunk_rows: 500,
        }
    }
}

impl PrefetchConfig {
    fn within(&self, rows: usize, cells: usize) -> bool {
        rows <= self.max_rows && cells <= self.max_cells
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchSkip {
    MergedSelection,
    SingleSheetWorkbook,
    ActiveSheetTooLarge,
}

/// Walks the sibling sheets of the active workbook, one parse at a time.
///
/// The session calls [`Prefetcher::next_candidate`] from its idle hook and
/// only ever runs one sibling parse; it also holds off while an interactive
/// parse is in flight.
#[derive(Debug, Default)]
pub struct Prefetcher {
    config: PrefetchConfig,
    generation: u64,
    queue: VecDeque<String>,
    slot: ParseSlot,
    in_flight: Option<String>,
}

impl Prefetcher {
    pub fn new(config: PrefetchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> PrefetchConfig {
        self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues the siblings of `active`, replacing any earlier plan.
    ///
    /// Siblings that are themselves over the thresholds are left out; they
    /// stay unparsed until the user asks for them.
    pub fn schedule(
        &mut self,
        generation: u64,
        workbook: &Workbook,
        active: &SheetSelection,
        parsed: &ParsedSheet,
    ) -> Result<usize, PrefetchSkip> {
        self.reset(generation);

        let SheetSelection::Single(active_name) = active else {
            return Err(PrefetchSkip::MergedSelection);
        };
        if workbook.sheets.len() < 2 {
            return Err(PrefetchSkip::SingleSheetWorkbook);
        }
        if !self.config.within(parsed.row_count(), parsed.cell_count()) {
            return Err(PrefetchSkip::ActiveSheetTooLarge);
        }

        for sheet in &workbook.sheets {
            if sheet.name == *active_name {
                continue;
            }
            if !self.config.within(sheet.row_count(), sheet.cell_count()) {
                tracing::debug!(
                    sheet = %sheet.name,
                    rows = sheet.row_count(),
                    "sibling too large to prefetch"
                );
                continue;
            }
            self.queue.push_back(sheet.name.clone());
        }

        Ok(self.queue.len())
    }

    /// Pops queued siblings until one is not cached yet.
    pub fn next_candidate(&mut self, cache: &ParsedSheetCache) -> Option<String> {
        if self.is_busy() {
            return None;
        }
        while let Some(name) = self.queue.pop_front() {
            if !cache.contains(&sheet_key(&SheetSelection::Single(name.clone()))) {
                return Some(name);
            }
        }
        None
    }

    pub fn start(&mut self, sheet: String, handle: ParseTaskHandle) {
        self.in_flight = Some(sheet);
        self.slot.start(handle);
    }

    /// Marks the task `id` as done; returns the sheet it was parsing.
    pub fn complete(&mut self, id: u64) -> Option<String> {
        self.slot.finish(id);
        if self.slot.is_busy() {
            return None;
        }
        self.in_flight.take()
    }

    /// Drops the plan and tears down the in-flight step.
    pub fn reset(&mut self, generation: u64) {
        self.generation = generation;
        self.queue.clear();
        self.slot.cancel();
        self.in_flight = None;
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
