use dioxus::prelude::{use_signal, Signal};

use sheetdeck::domain::entities::source::{DataSource, SourceId};
use sheetdeck::usecase::services::orchestrator::{CacheStats, ViewState};

#[derive(Clone, Copy)]
pub struct AppState {
    pub sources: Signal<Vec<DataSource>>,
    pub selected_source: Signal<Option<SourceId>>,
    pub view: Signal<ViewState>,
    pub cache_stats: Signal<Option<CacheStats>>,
    pub status: Signal<String>,
    pub origin_input: Signal<String>,
    pub paste_name: Signal<String>,
    pub paste_text: Signal<String>,
    pub show_paste: Signal<bool>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            sources: use_signal(Vec::<DataSource>::new),
            selected_source: use_signal(|| None::<SourceId>),
            view: use_signal(ViewState::default),
            cache_stats: use_signal(|| None::<CacheStats>),
            status: use_signal(|| "Ready".to_string()),
            origin_input: use_signal(String::new),
            paste_name: use_signal(|| "Pasted".to_string()),
            paste_text: use_signal(String::new),
            show_paste: use_signal(|| false),
        }
    }
}
