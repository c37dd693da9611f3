use thiserror::Error;

/// Failures surfaced to the presentation layer.
///
/// Cache write failures are only logged and stale results are silently
/// dropped, so neither has a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("{source_name} is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },
    #[error("no cached copy of {source_name}; re-import required")]
    CacheMissNoOrigin { source_name: String },
    #[error("failed to parse {sheet}: {reason}")]
    ParseFailure { sheet: String, reason: String },
    #[error("sheet not found in workbook: {sheet}")]
    UnknownSheet { sheet: String },
    #[error("no workbook is loaded")]
    NoActiveWorkbook,
}
