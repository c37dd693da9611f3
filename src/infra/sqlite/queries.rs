use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use crate::domain::entities::source::{DataSource, SourceId, SourceKind};
use crate::infra::sqlite::schema::open_connection;

type SourceRow = (i64, String, String, String, Option<String>, String, Option<String>);

const SOURCE_COLUMNS: &str = "id, name, url, kind, selected_sheets, added_at, last_used_at";

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp: {value}"))?
        .with_timezone(&Utc))
}

fn encode_selection(selected: Option<&[String]>) -> Result<Option<String>> {
    selected
        .filter(|names| !names.is_empty())
        .map(|names| serde_json::to_string(names).context("failed to encode selected sheets"))
        .transpose()
}

fn source_from_row(row: SourceRow) -> Result<DataSource> {
    let (id, name, url, kind, selected, added_at, last_used_at) = row;
    let kind = SourceKind::parse(&kind).ok_or_else(|| anyhow!("unknown source kind: {kind}"))?;
    let selected_sheets = selected
        .map(|json| {
            serde_json::from_str::<Vec<String>>(&json)
                .with_context(|| format!("invalid selected sheets for source {id}"))
        })
        .transpose()?;

    Ok(DataSource {
        id: SourceId(id),
        name,
        url,
        kind,
        selected_sheets,
        added_at: parse_timestamp(&added_at)?,
        last_used_at: last_used_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn read_source_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

pub fn insert_source(
    db_path: &Path,
    name: &str,
    url: &str,
    kind: SourceKind,
    selected: Option<&[String]>,
) -> Result<DataSource> {
    let conn = open_connection(db_path)?;
    let added_at = Utc::now();
    conn.execute(
        "INSERT INTO data_source(name, url, kind, selected_sheets, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            url,
            kind.as_str(),
            encode_selection(selected)?,
            format_timestamp(added_at)
        ],
    )
    .context("failed to insert data source")?;
    let id = conn.last_insert_rowid();

    Ok(DataSource {
        id: SourceId(id),
        name: name.to_string(),
        url: url.to_string(),
        kind,
        selected_sheets: selected.filter(|names| !names.is_empty()).map(<[String]>::to_vec),
        added_at: parse_timestamp(&format_timestamp(added_at))?,
        last_used_at: None,
    })
}

pub fn list_sources(db_path: &Path) -> Result<Vec<DataSource>> {
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SOURCE_COLUMNS}
             FROM data_source
             ORDER BY COALESCE(last_used_at, added_at) DESC, id DESC"
        ))
        .context("failed to prepare source list query")?;

    let rows = stmt
        .query_map([], read_source_row)
        .context("failed to query data sources")?;

    let mut sources = Vec::new();
    for row in rows {
        let row = row.context("failed to read data source row")?;
        sources.push(source_from_row(row)?);
    }

    Ok(sources)
}

pub fn get_source(db_path: &Path, source_id: i64) -> Result<Option<DataSource>> {
    let conn = open_connection(db_path)?;
    let row = conn
        .query_row(
            &format!("SELECT {SOURCE_COLUMNS} FROM data_source WHERE id = ?1"),
            [source_id],
            read_source_row,
        )
        .optional()
        .context("failed to query data source")?;

    row.map(source_from_row).transpose()
}

/// Returns the number of rows touched so callers can tell a missing id apart.
pub fn rename_source(db_path: &Path, source_id: i64, name: &str) -> Result<usize> {
    let conn = open_connection(db_path)?;
    conn.execute(
        "UPDATE data_source SET name = ?1 WHERE id = ?2",
        params![name, source_id],
    )
    .context("failed to rename data source")
}

pub fn set_selected_sheets(
    db_path: &Path,
    source_id: i64,
    selected: Option<&[String]>,
) -> Result<usize> {
    let conn = open_connection(db_path)?;
    conn.execute(
        "UPDATE data_source SET selected_sheets = ?1 WHERE id = ?2",
        params![encode_selection(selected)?, source_id],
    )
    .context("failed to update selected sheets")
}

pub fn touch_source(db_path: &Path, source_id: i64) -> Result<usize> {
    let conn = open_connection(db_path)?;
    conn.execute(
        "UPDATE data_source SET last_used_at = ?1 WHERE id = ?2",
        params![format_timestamp(Utc::now()), source_id],
    )
    .context("failed to update last used time")
}

pub fn remove_source(db_path: &Path, source_id: i64) -> Result<usize> {
    let conn = open_connection(db_path)?;
    conn.execute("DELETE FROM data_source WHERE id = ?1", [source_id])
        .context("failed to delete data source")
}
