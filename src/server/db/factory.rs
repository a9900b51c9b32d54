use std::sync::Arc;

use anyhow::{Context, Result};

use super::config::DbConfig;
use super::sqlite::factory::SqliteFactory;
use super::{Database, UnionConnection};

pub struct DbFactory;

impl DbFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn build_db(&self, cfg: &DbConfig) -> Result<Arc<Database>> {
        let sqlite = SqliteFactory::new()
            .build_sqlite(&cfg.sqlite)
            .context("init sqlite")?;
        Ok(Arc::new(Database::new(UnionConnection::Sqlite(sqlite))))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CommonConfig, PathSet};

    use super::*;

    #[test]
    fn test_build_db() {
        let ps = PathSet::new_test();
        let mut cfg: DbConfig = toml::from_str("[sqlite]\nmemory = true").unwrap();
        cfg.complete(&ps).unwrap();

        let db = DbFactory::new().build_db(&cfg).unwrap();
        let users = db.with_transaction(|tx| tx.list_users(&[])).unwrap();
        assert!(users.is_empty());
    }
}
