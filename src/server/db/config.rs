use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{CommonConfig, PathSet};

use super::sqlite::config::SqliteConfig;

/// Storage of users, games, deals and authorization policies. SQLite is the
/// only backend.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DbConfig {
    #[serde(default = "SqliteConfig::default")]
    pub sqlite: SqliteConfig,
}

impl CommonConfig for DbConfig {
    fn default() -> Self {
        Self {
            sqlite: SqliteConfig::default(),
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        self.sqlite.complete(ps).context("sqlite")?;
        Ok(())
    }
}
