//! Local origins: spreadsheet files on disk and pasted text.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;

use crate::domain::entities::source::{DataSource, SourceKind};
use crate::domain::entities::workbook::{filter_workbook, Workbook};
use crate::infra::import::csv::{parse_pasted_text, read_csv};
use crate::infra::import::xlsx::read_spreadsheet;
use crate::usecase::ports::origin::{Credentials, FetchProgress, FetchRequest, OriginFetcher};
use crate::usecase::ports::repo::{NewDataSource, SourceRepository};
use crate::usecase::services::orchestrator::Session;

const FILE_SCHEME: &str = "file://";
const PASTE_SCHEME: &str = "paste://";

pub fn file_url(path: &Path) -> String {
    format!("{FILE_SCHEME}{}", path.display())
}

fn path_from_url(url: &str) -> Option<PathBuf> {
    url.strip_prefix(FILE_SCHEME).map(PathBuf::from)
}

/// Reads a spreadsheet or csv file, choosing the reader by extension.
pub fn read_local_workbook(path: &Path) -> Result<Workbook> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_spreadsheet(path),
        other => bail!("unsupported file type: .{other}"),
    }
}

/// Origin for shared workbooks reachable through the filesystem (`file://` urls),
/// such as a spreadsheet on a network share that other people keep editing.
///
/// The file is always read whole, so credentials change nothing here; a
/// requested sheet subset is applied after reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOrigin;

impl OriginFetcher for FileOrigin {
    fn fetch(
        &self,
        request: &FetchRequest,
        _credentials: Option<&Credentials>,
        on_progress: &dyn Fn(FetchProgress),
    ) -> Result<Workbook> {
        let path = path_from_url(&request.url)
            .ok_or_else(|| anyhow!("no origin connector for url: {}", request.url))?;
        let workbook = read_local_workbook(&path)?;
        let workbook = match &request.sheet_selection {
            Some(names) => filter_workbook(&workbook, names),
            None => workbook,
        };
        on_progress(FetchProgress {
            loaded_sheets: workbook.sheets.len(),
            total_sheets: workbook.sheets.len(),
        });
        Ok(workbook)
    }
}

fn register_and_show(
    repo: &dyn SourceRepository,
    session: &mut Session,
    source: NewDataSource,
    workbook: Workbook,
) -> Result<DataSource> {
    if workbook.is_empty() {
        bail!("{} contains no sheets", source.name);
    }
    let source = repo
        .add_source(source)
        .context("failed to register data source")?;
    session.load_imported(source.clone(), workbook)?;
    tracing::info!(source = %source.name, kind = source.kind.as_str(), "source imported");
    Ok(source)
}

/// Imports a local file as a local-only source: registers it and caches the copy.
pub fn import_file(
    repo: &dyn SourceRepository,
    session: &mut Session,
    path: &Path,
) -> Result<DataSource> {
    let workbook = read_local_workbook(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("workbook")
        .to_string();
    register_and_show(
        repo,
        session,
        NewDataSource {
            name,
            url: file_url(path),
            kind: SourceKind::LocalFile,
            selected_sheets: None,
        },
        workbook,
    )
}

/// Imports pasted text as a manual-paste source.
pub fn import_paste(
    repo: &dyn SourceRepository,
    session: &mut Session,
    name: &str,
    text: &str,
) -> Result<DataSource> {
    let workbook = parse_pasted_text(text, name)?;
    let url = format!(
        "{PASTE_SCHEME}{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    register_and_show(
        repo,
        session,
        NewDataSource {
            name: name.to_string(),
            url,
            kind: SourceKind::ManualPaste,
            selected_sheets: None,
        },
        workbook,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: String, selection: Option<Vec<String>>) -> FetchRequest {
        FetchRequest {
            url,
            name: "shared".to_string(),
            kind: SourceKind::RemoteCollaborative,
            sheet_selection: selection,
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_local_workbook(Path::new("notes.txt")).expect_err("txt should fail");
        assert!(err.to_string().contains(".txt"));
    }

    #[test]
    fn file_origin_reads_csv_and_reports_progress() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let path = temp_dir.path().join("stock.csv");
        std::fs::write(&path, "Part,Qty\nbolt,3\n").expect("should write csv");
        let seen = std::cell::Cell::new(None);

        let workbook = FileOrigin
            .fetch(&request(file_url(&path), None), None, &|progress| seen.set(Some(progress)))
            .expect("fetch should succeed");

        assert_eq!(workbook.sheet_names(), vec!["stock"]);
        assert_eq!(
            seen.get(),
            Some(FetchProgress {
                loaded_sheets: 1,
                total_sheets: 1
            })
        );
    }

    #[test]
    fn file_origin_applies_sheet_selection() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let path = temp_dir.path().join("stock.csv");
        std::fs::write(&path, "Part,Qty\n").expect("should write csv");

        let workbook = FileOrigin
            .fetch(
                &request(file_url(&path), Some(vec!["other".to_string()])),
                None,
                &|_| {},
            )
            .expect("fetch should succeed");

        assert!(workbook.is_empty());
    }

    #[test]
    fn file_origin_rejects_other_schemes() {
        let err = FileOrigin
            .fetch(&request("https://sheets.example.com/d/1".to_string(), None), None, &|_| {})
            .expect_err("https should fail");

        assert!(err.to_string().contains("no origin connector"));
    }
}
