use std::path::PathBuf;

use crate::domain::entities::source::{DataSource, SourceId};
use crate::infra::sqlite::queries::{
    get_source, insert_source, list_sources, remove_source, rename_source, set_selected_sheets,
    touch_source,
};
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::repo::{NewDataSource, RepoError, SourceRepository};

pub struct SqliteSourceRepo {
    pub db_path: PathBuf,
}

impl SqliteSourceRepo {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

fn expect_one(id: SourceId, touched: usize) -> Result<(), RepoError> {
    if touched == 0 {
        Err(RepoError::NotFound(id))
    } else {
        Ok(())
    }
}

impl SourceRepository for SqliteSourceRepo {
    fn init(&self) -> Result<(), RepoError> {
        init_db(&self.db_path).map_err(|err| RepoError::Message(err.to_string()))
    }

    fn list_sources(&self) -> Result<Vec<DataSource>, RepoError> {
        list_sources(&self.db_path).map_err(|err| RepoError::Message(format!("{err:#}")))
    }

    fn get_source(&self, id: SourceId) -> Result<DataSource, RepoError> {
        get_source(&self.db_path, id.0)
            .map_err(|err| RepoError::Message(format!("{err:#}")))?
            .ok_or(RepoError::NotFound(id))
    }

    fn add_source(&self, source: NewDataSource) -> Result<DataSource, RepoError> {
        insert_source(
            &self.db_path,
            &source.name,
            &source.url,
            source.kind,
            source.selected_sheets.as_deref(),
        )
        .map_err(|err| RepoError::Message(format!("{err:#}")))
    }

    fn rename_source(&self, id: SourceId, name: String) -> Result<(), RepoError> {
        let touched = rename_source(&self.db_path, id.0, &name)
            .map_err(|err| RepoError::Message(err.to_string()))?;
        expect_one(id, touched)
    }

    fn set_selected_sheets(
        &self,
        id: SourceId,
        selected: Option<Vec<String>>,
    ) -> Result<(), RepoError> {
        let touched = set_selected_sheets(&self.db_path, id.0, selected.as_deref())
            .map_err(|err| RepoError::Message(format!("{err:#}")))?;
        expect_one(id, touched)
    }

    fn touch_source(&self, id: SourceId) -> Result<(), RepoError> {
        let touched = touch_source(&self.db_path, id.0)
            .map_err(|err| RepoError::Message(err.to_string()))?;
        expect_one(id, touched)
    }

    fn remove_source(&self, id: SourceId) -> Result<(), RepoError> {
        let touched = remove_source(&self.db_path, id.0)
            .map_err(|err| RepoError::Message(err.to_string()))?;
        expect_one(id, touched)
    }
}
