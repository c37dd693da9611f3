mod app;
mod ui {
    pub mod state {
        pub mod app_state;
    }
}

use sheetdeck::logging::init_logging;
use sheetdeck::platform::paths::AppPaths;

fn main() {
    init_logging();

    let webview_data_dir = AppPaths::resolve()
        .and_then(|paths| paths.webview_data_dir())
        .expect("should resolve and create webview data directory");

    dioxus::LaunchBuilder::desktop()
        .with_cfg(
            dioxus::desktop::Config::new()
                .with_window(dioxus::desktop::WindowBuilder::new().with_title("Sheetdeck"))
                .with_data_directory(webview_data_dir),
        )
        .launch(app::App);
}
