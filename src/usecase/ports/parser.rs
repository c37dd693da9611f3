use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::domain::entities::source::SheetSelection;
use crate::domain::entities::workbook::{ParsedSheet, RawSheet, Workbook};

/// Message accepted by the parse worker boundary.
///
/// The workbook travels as a shared handle; the worker only reads the sheets
/// named by `selection`, and uses the full sheet list for labelling.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub id: u64,
    pub selection: SheetSelection,
    pub workbook: Arc<Workbook>,
    pub chunk_rows: usize,
}

impl ParseRequest {
    pub fn all_sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    /// Raw sheets for the selection, in selection order.
    pub fn sheets(&self) -> Result<Vec<&RawSheet>, ParseError> {
        self.selection
            .sheet_names()
            .into_iter()
            .map(|name| {
                self.workbook
                    .sheet(name)
                    .ok_or_else(|| ParseError::MissingSheet(name.to_string()))
            })
            .collect()
    }
}

/// Sent back exactly once per request, whether the parse succeeded, failed or was torn down.
#[derive(Debug, Clone)]
pub struct ParseReply {
    pub id: u64,
    pub outcome: Result<ParsedSheet, ParseError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("parse was cancelled")]
    Cancelled,
    #[error("sheet not found in workbook: {0}")]
    MissingSheet(String),
    #[error("parse worker failed: {0}")]
    Failed(String),
}

/// Advisory cancellation shared between a task handle and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Turns raw sheets into a [`ParsedSheet`]. Runs on a worker thread.
pub trait SheetParser: Send + Sync {
    fn parse(&self, request: &ParseRequest, cancel: &CancelFlag) -> Result<ParsedSheet, ParseError>;
}
