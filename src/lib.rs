//! Workbook acquisition and caching for sheetdeck.
//!
//! Workbooks come from a persistent cache, an origin, or a local import; sheets
//! are parsed off the interactive thread and kept in memory per workbook, with
//! siblings pre-parsed while the user is idle.

pub mod config;
pub mod logging;

pub mod domain {
    pub mod cache_key;
    pub mod entities {
        pub mod source;
        pub mod workbook;
    }
}

pub mod usecase {
    pub mod ports {
        pub mod cache_backend;
        pub mod origin;
        pub mod parser;
        pub mod repo;
    }
    pub mod services {
        pub mod cache_io;
        pub mod coordinator;
        pub mod error;
        pub mod normalize;
        pub mod orchestrator;
        pub mod parse_task;
        pub mod prefetch;
        pub mod sheet_cache;
    }
}

pub mod infra {
    pub mod cache;
    pub mod origin;
    pub mod import {
        pub mod csv;
        pub mod xlsx;
    }
    pub mod sqlite {
        pub mod queries;
        pub mod repo;
        pub mod schema;
    }
}

pub mod platform {
    pub mod capability;
    pub mod paths;
}

pub use config::AppConfig;
pub use domain::entities::source::{DataSource, SheetSelection, SourceId, SourceKind};
pub use domain::entities::workbook::{ParsedSheet, RawSheet, Scalar, Workbook};
pub use usecase::services::error::LoadError;
pub use usecase::services::orchestrator::{CacheStats, Session, SessionEvent, ShownSheet, ViewState};
