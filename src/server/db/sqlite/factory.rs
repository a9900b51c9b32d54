use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use super::config::SqliteConfig;
use super::Sqlite;

pub struct SqliteFactory;

impl SqliteFactory {
    pub fn new() -> Self {
        Self {}
    }

    /// Opens the database file, creating its directory and the deal tables on
    /// first start.
    pub fn build_sqlite(&self, cfg: &SqliteConfig) -> Result<Sqlite> {
        if cfg.memory {
            warn!("Using in-memory sqlite database, users, deals and policies are lost when the server stops");
            return Sqlite::memory();
        }

        let path = Path::new(&cfg.path);
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("create sqlite directory '{}'", dir.display()))?;
        }

        info!("Using sqlite database: {}", cfg.path);
        Sqlite::open(path).with_context(|| format!("open sqlite '{}'", cfg.path))
    }
}
