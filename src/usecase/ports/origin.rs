use anyhow::Result;

use crate::domain::entities::source::{DataSource, SourceKind};
use crate::domain::entities::workbook::Workbook;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
}

/// What the origin is asked for.
///
/// `sheet_selection` is only honoured on the credentialed path; the public-read
/// path always returns the whole workbook and the caller filters it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub name: String,
    pub kind: SourceKind,
    pub sheet_selection: Option<Vec<String>>,
}

impl FetchRequest {
    pub fn for_source(source: &DataSource) -> Self {
        Self {
            url: source.url.clone(),
            name: source.name.clone(),
            kind: source.kind,
            sheet_selection: source.selection().map(<[String]>::to_vec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub loaded_sheets: usize,
    pub total_sheets: usize,
}

/// Origin Fetch Service.
///
/// Implementations may block; the session always calls them off the
/// interactive thread. Any timeout policy belongs to the implementation.
pub trait OriginFetcher: Send + Sync {
    fn fetch(
        &self,
        request: &FetchRequest,
        credentials: Option<&Credentials>,
        on_progress: &dyn Fn(FetchProgress),
    ) -> Result<Workbook>;
}
