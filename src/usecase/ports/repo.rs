use crate::domain::entities::source::{DataSource, SourceId, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    NotFound(SourceId),
    Message(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::NotFound(id) => write!(f, "data source {} not found", id.0),
            RepoError::Message(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RepoError {}

/// Registered data sources. Sources are never removed except through
/// [`SourceRepository::remove_source`].
pub trait SourceRepository: Send + Sync {
    fn init(&self) -> Result<(), RepoError>;

    fn list_sources(&self) -> Result<Vec<DataSource>, RepoError>;
    fn get_source(&self, id: SourceId) -> Result<DataSource, RepoError>;
    fn add_source(&self, source: NewDataSource) -> Result<DataSource, RepoError>;
    fn rename_source(&self, id: SourceId, name: String) -> Result<(), RepoError>;
    fn set_selected_sheets(
        &self,
        id: SourceId,
        selected: Option<Vec<String>>,
    ) -> Result<(), RepoError>;
    fn touch_source(&self, id: SourceId) -> Result<(), RepoError>;
    fn remove_source(&self, id: SourceId) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataSource {
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub selected_sheets: Option<Vec<String>>,
}
