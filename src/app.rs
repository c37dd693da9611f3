use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dioxus::prelude::*;
use rfd::FileDialog;

use sheetdeck::config::AppConfig;
use sheetdeck::domain::entities::source::{DataSource, SheetSelection, SourceKind};
use sheetdeck::domain::entities::workbook::ParsedSheet;
use sheetdeck::infra::cache::select_backend;
use sheetdeck::infra::origin::{file_url, import_file, import_paste, FileOrigin};
use sheetdeck::infra::sqlite::repo::SqliteSourceRepo;
use sheetdeck::platform::capability::RuntimeCapabilities;
use sheetdeck::usecase::ports::repo::{NewDataSource, SourceRepository};
use sheetdeck::usecase::services::orchestrator::{Session, SessionEvent};

use crate::ui::state::app_state::AppState;

const PUMP_INTERVAL: Duration = Duration::from_millis(30);
const MAX_RENDERED_ROWS: usize = 500;

struct Runtime {
    repo: SqliteSourceRepo,
    session: RefCell<Session>,
}

fn build_runtime(config: AppConfig) -> Result<Runtime> {
    let repo = SqliteSourceRepo::new(config.db_path());
    repo.init()?;

    let capabilities = RuntimeCapabilities::probe(&config.cache_dir);
    let backend = select_backend(
        capabilities,
        &config.cache_dir,
        &config.db_path(),
        config.embedded_limits(),
    )?;
    let session = Session::new(config.session_config(), backend, Arc::new(FileOrigin));

    Ok(Runtime {
        repo,
        session: RefCell::new(session),
    })
}

fn refresh_sources(runtime: &Runtime, mut state: AppState) {
    match runtime.repo.list_sources() {
        Ok(sources) => state.sources.set(sources),
        Err(err) => state.status.set(format!("Failed to list sources: {err}")),
    }
}

fn sync_view(runtime: &Runtime, mut state: AppState) {
    let session = runtime.session.borrow();
    state.view.set(session.view().clone());
    state.cache_stats.set(Some(session.cache_stats()));
}

fn apply_events(runtime: &Runtime, mut state: AppState, events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::WorkbookApplied { from_cache: true, .. } => {
                state.status.set("Showing cached copy".to_string());
            }
            SessionEvent::WorkbookApplied { .. } => state.status.set("Loaded".to_string()),
            SessionEvent::Refreshed { .. } => state.status.set("Refreshed from origin".to_string()),
            SessionEvent::RefreshFailed { reason } => {
                state
                    .status
                    .set(format!("Refresh failed, showing cached copy: {reason}"));
            }
            SessionEvent::Failed(err) => state.status.set(err.to_string()),
            SessionEvent::SheetApplied { .. } | SessionEvent::Prefetched { .. } => {}
        }
    }
    sync_view(runtime, state);
}

fn open_source(runtime: &Runtime, mut state: AppState, source: DataSource) {
    if let Err(err) = runtime.repo.touch_source(source.id) {
        tracing::warn!(error = %err, "failed to record source use");
    }
    state.selected_source.set(Some(source.id));
    state.status.set(format!("Loading {}", source.name));
    runtime.session.borrow_mut().load_source(source);
    sync_view(runtime, state);
}

fn origin_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        file_url(Path::new(trimmed))
    }
}

fn pick_spreadsheet() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Spreadsheet", &["xlsx", "xls", "xlsm", "xlsb", "ods"])
        .add_filter("CSV", &["csv"])
        .add_filter("All files", &["*"])
        .pick_file()
}

fn cell_text(parsed: &ParsedSheet, row_idx: usize, column: &str) -> String {
    parsed
        .value(row_idx, column)
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[component]
pub fn App() -> Element {
    let runtime = use_hook(|| {
        AppConfig::from_env()
            .and_then(build_runtime)
            .map(Rc::new)
            .map_err(|err| format!("{err:#}"))
    });
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(err) => {
            return rsx! {
                div {
                    p { "Unable to start: {err}" }
                }
            };
        }
    };

    let mut state = AppState::new();

    let runtime_for_init = runtime.clone();
    use_effect(move || {
        refresh_sources(&runtime_for_init, state);
        sync_view(&runtime_for_init, state);
    });

    let runtime_for_pump = runtime.clone();
    use_future(move || {
        let runtime = runtime_for_pump.clone();
        async move {
            loop {
                tokio::time::sleep(PUMP_INTERVAL).await;
                let (events, busy) = {
                    let mut session = runtime.session.borrow_mut();
                    let events = session.pump();
                    if events.is_empty() {
                        session.run_idle();
                    }
                    let view = session.view();
                    (events, view.loading || view.refreshing)
                };
                if !events.is_empty() {
                    apply_events(&runtime, state, &events);
                } else if busy {
                    sync_view(&runtime, state);
                }
            }
        }
    });

    let runtime_for_import = runtime.clone();
    let handle_import = move |_: MouseEvent| {
        let Some(path) = pick_spreadsheet() else {
            return;
        };
        let outcome = {
            let mut session = runtime_for_import.session.borrow_mut();
            import_file(&runtime_for_import.repo, &mut session, &path)
        };
        match outcome {
            Ok(source) => {
                state.selected_source.set(Some(source.id));
                state.status.set(format!("Imported {}", source.name));
            }
            Err(err) => state.status.set(format!("Import failed: {err:#}")),
        }
        refresh_sources(&runtime_for_import, state);
        sync_view(&runtime_for_import, state);
    };

    let runtime_for_paste = runtime.clone();
    let handle_paste = move |_: MouseEvent| {
        let outcome = {
            let mut session = runtime_for_paste.session.borrow_mut();
            import_paste(
                &runtime_for_paste.repo,
                &mut session,
                state.paste_name.read().trim(),
                &state.paste_text.read(),
            )
        };
        match outcome {
            Ok(source) => {
                state.selected_source.set(Some(source.id));
                state.paste_text.set(String::new());
                state.show_paste.set(false);
                state.status.set(format!("Imported {}", source.name));
            }
            Err(err) => state.status.set(format!("Paste failed: {err:#}")),
        }
        refresh_sources(&runtime_for_paste, state);
        sync_view(&runtime_for_paste, state);
    };

    let runtime_for_origin = runtime.clone();
    let handle_add_origin = move |_: MouseEvent| {
        let input = state.origin_input.read().trim().to_string();
        if input.is_empty() {
            return;
        }
        let url = origin_url(&input);
        let name = Path::new(&input)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&input)
            .to_string();
        match runtime_for_origin.repo.add_source(NewDataSource {
            name,
            url,
            kind: SourceKind::RemoteCollaborative,
            selected_sheets: None,
        }) {
            Ok(source) => {
                state.origin_input.set(String::new());
                refresh_sources(&runtime_for_origin, state);
                open_source(&runtime_for_origin, state, source);
            }
            Err(err) => state.status.set(format!("Failed to add source: {err}")),
        }
    };

    let view = state.view.read().clone();
    let sources = state.sources.read().clone();
    let selected_source = *state.selected_source.read();
    let show_paste = *state.show_paste.read();
    let active_sheet = view.selection.clone();
    let parsed = view.parsed.clone().map(|shown| shown.data);
    let stats_line = state
        .cache_stats
        .read()
        .as_ref()
        .map(|stats| {
            format!(
                "{} cached workbook(s), {} KiB ({})",
                stats.entry_count,
                stats.total_size / 1024,
                stats.backend
            )
        })
        .unwrap_or_default();
    let progress_line = view
        .progress
        .map(|progress| format!("{}/{} sheets", progress.loaded_sheets, progress.total_sheets))
        .unwrap_or_default();

    rsx! {
        div { style: "display: flex; height: 100vh; font-family: sans-serif;",
            div { style: "width: 260px; border-right: 1px solid #ddd; padding: 8px; overflow-y: auto;",
                h3 { "Sources" }
                {sources.into_iter().map(|source| {
                    let runtime_for_open = runtime.clone();
                    let runtime_for_remove = runtime.clone();
                    let source_for_open = source.clone();
                    let source_for_remove = source.clone();
                    let weight = if selected_source == Some(source.id) { "bold" } else { "normal" };
                    let row_key = source.id.0;
                    rsx! {
                        div { key: "{row_key}", style: "display: flex; gap: 4px; margin-bottom: 4px;",
                            button {
                                style: "flex: 1; text-align: left; font-weight: {weight};",
                                onclick: move |_| open_source(&runtime_for_open, state, source_for_open.clone()),
                                "{source.name}"
                            }
                            button {
                                title: "Remove source and its cached copy",
                                onclick: move |_| {
                                    match runtime_for_remove.repo.remove_source(source_for_remove.id) {
                                        Ok(()) => {
                                            runtime_for_remove.session.borrow_mut().forget_source(&source_for_remove);
                                            if selected_source == Some(source_for_remove.id) {
                                                state.selected_source.set(None);
                                            }
                                            state.status.set(format!("Removed {}", source_for_remove.name));
                                        }
                                        Err(err) => state.status.set(format!("Failed to remove source: {err}")),
                                    }
                                    refresh_sources(&runtime_for_remove, state);
                                    sync_view(&runtime_for_remove, state);
                                },
                                "×"
                            }
                        }
                    }
                })}
                hr {}
                button { onclick: handle_import, "Import file…" }
                button {
                    onclick: move |_| {
                        let shown = *state.show_paste.read();
                        state.show_paste.set(!shown);
                    },
                    "Paste data…"
                }
                if show_paste {
                    div {
                        input {
                            value: "{state.paste_name}",
                            oninput: move |evt| state.paste_name.set(evt.value()),
                        }
                        textarea {
                            rows: "8",
                            value: "{state.paste_text}",
                            oninput: move |evt| state.paste_text.set(evt.value()),
                        }
                        button { onclick: handle_paste, "Import paste" }
                    }
                }
                hr {}
                input {
                    placeholder: "Shared workbook path or url",
                    value: "{state.origin_input}",
                    oninput: move |evt| state.origin_input.set(evt.value()),
                }
                button { onclick: handle_add_origin, "Add shared source" }
            }
            div { style: "flex: 1; display: flex; flex-direction: column; overflow: hidden;",
                div { style: "padding: 6px; border-bottom: 1px solid #ddd;",
                    span { "{state.status}" }
                    if view.loading { span { " · loading {progress_line}" } }
                    if view.refreshing { span { " · refreshing" } }
                    if view.parsing { span { " · parsing" } }
                    span { style: "float: right; color: #888;", "{stats_line}" }
                }
                div { style: "padding: 6px; display: flex; gap: 4px; flex-wrap: wrap;",
                    {view.sheet_names.iter().map(|name| {
                        let runtime_for_switch = runtime.clone();
                        let selection = SheetSelection::Single(name.clone());
                        let weight = if active_sheet.as_ref() == Some(&selection) { "bold" } else { "normal" };
                        rsx! {
                            button {
                                key: "{name}",
                                style: "font-weight: {weight};",
                                onclick: move |_| {
                                    let outcome = runtime_for_switch.session.borrow_mut().switch_sheet(selection.clone());
                                    if let Err(err) = outcome {
                                        state.status.set(err.to_string());
                                    }
                                    sync_view(&runtime_for_switch, state);
                                },
                                "{name}"
                            }
                        }
                    })}
                    if view.sheet_names.len() > 1 {
                        button {
                            onclick: {
                                let runtime_for_merge = runtime.clone();
                                let names = view.sheet_names.clone();
                                move |_| {
                                    let outcome = runtime_for_merge
                                        .session
                                        .borrow_mut()
                                        .switch_sheet(SheetSelection::Multi(names.clone()));
                                    if let Err(err) = outcome {
                                        state.status.set(err.to_string());
                                    }
                                    sync_view(&runtime_for_merge, state);
                                }
                            },
                            "All sheets"
                        }
                    }
                }
                div { style: "flex: 1; overflow: auto; padding: 6px;",
                    if let Some(parsed) = parsed {
                        table { style: "border-collapse: collapse;",
                            thead {
                                tr {
                                    for column in parsed.columns.iter() {
                                        th { style: "border: 1px solid #ccc; padding: 2px 6px;", "{column}" }
                                    }
                                }
                            }
                            tbody {
                                for row_idx in 0..parsed.row_count().min(MAX_RENDERED_ROWS) {
                                    tr {
                                        for column in parsed.columns.iter() {
                                            td { style: "border: 1px solid #eee; padding: 2px 6px;",
                                                {cell_text(&parsed, row_idx, column)}
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        if parsed.row_count() > MAX_RENDERED_ROWS {
                            p { {format!("Showing the first {MAX_RENDERED_ROWS} of {} rows.", parsed.row_count())} }
                        }
                    } else if let Some(err) = view.error.as_ref() {
                        p { style: "color: #b00;", "{err}" }
                    }
                }
            }
        }
    }
}
