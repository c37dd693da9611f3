use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub i64);

impl From<i64> for SourceId {
    fn from(value: i64) -> Self {
        SourceId(value)
    }
}

impl From<SourceId> for i64 {
    fn from(value: SourceId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    RemoteCollaborative,
    LocalFile,
    ManualPaste,
}

impl SourceKind {
    /// Only remote sources have an origin that can be fetched again.
    pub fn has_origin(self) -> bool {
        matches!(self, SourceKind::RemoteCollaborative)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::RemoteCollaborative => "remote-collaborative",
            SourceKind::LocalFile => "local-file",
            SourceKind::ManualPaste => "manual-paste",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "remote-collaborative" => Some(SourceKind::RemoteCollaborative),
            "local-file" => Some(SourceKind::LocalFile),
            "manual-paste" => Some(SourceKind::ManualPaste),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    /// Ordered subset of sheets the user picked; `None` means the whole workbook.
    pub selected_sheets: Option<Vec<String>>,
    pub added_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl DataSource {
    pub fn selection(&self) -> Option<&[String]> {
        self.selected_sheets
            .as_deref()
            .filter(|names| !names.is_empty())
    }
}

/// What the user asked to look at inside the active workbook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetSelection {
    Single(String),
    Multi(Vec<String>),
}

impl SheetSelection {
    pub fn sheet_names(&self) -> Vec<&str> {
        match self {
            SheetSelection::Single(name) => vec![name.as_str()],
            SheetSelection::Multi(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, SheetSelection::Single(_))
    }

    /// Label used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            SheetSelection::Single(name) => name.clone(),
            SheetSelection::Multi(names) => names.join(", "),
        }
    }
}
