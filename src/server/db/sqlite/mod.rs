mod deal;
mod game;
mod policy;
mod user;

pub mod config;
pub mod factory;

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection as RawConnection;
use rusqlite::Transaction as RawTransaction;

use super::{Connection, DealQuery, DealRecord, GameRecord, PolicyRecord, Transaction, UserRecord};

/// SQLite-based database implementation, file backed or in-memory.
pub struct Sqlite {
    conn: RawConnection,
}

pub struct SqliteTransaction<'a> {
    tx: RawTransaction<'a>,
}

impl Sqlite {
    /// Opens a SQLite database file, creating it and all tables if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = RawConnection::open(path)?;
        Self::init_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Creates a new in-memory database. Content is lost when the program exits.
    pub fn memory() -> Result<Self> {
        let conn = RawConnection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self { conn })
    }

    fn init_tables(db: &RawConnection) -> Result<()> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;
        user::create_user_tables(db)?;
        game::create_game_tables(db)?;
        deal::create_deal_tables(db)?;
        policy::create_policy_tables(db)?;
        Ok(())
    }
}

impl<'a> Connection<'a, SqliteTransaction<'a>> for Sqlite {
    fn transaction(&'a mut self) -> Result<SqliteTransaction<'a>> {
        let tx = self.conn.transaction()?;
        Ok(SqliteTransaction { tx })
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn create_user(&self, user: UserRecord) -> Result<UserRecord> {
        user::create_user(&self.tx, user)
    }

    fn get_user(&self, id: u64) -> Result<Option<UserRecord>> {
        user::get_user(&self.tx, id)
    }

    fn get_user_by_name(&self, username: &str) -> Result<Option<UserRecord>> {
        user::get_user_by_name(&self.tx, username)
    }

    fn list_users(&self, ids: &[u64]) -> Result<Vec<UserRecord>> {
        user::list_users(&self.tx, ids)
    }

    fn update_user_password(&self, id: u64, hash: &str, must_reset: bool) -> Result<()> {
        user::update_user_password(&self.tx, id, hash, must_reset)
    }

    fn create_game(&self, game: GameRecord) -> Result<GameRecord> {
        game::create_game(&self.tx, game)
    }

    fn get_game(&self, id: u64) -> Result<Option<GameRecord>> {
        game::get_game(&self.tx, id)
    }

    fn list_games(&self, offset: u64, limit: u64) -> Result<Vec<GameRecord>> {
        game::list_games(&self.tx, offset, limit)
    }

    fn create_deal(&self, deal: DealRecord) -> Result<DealRecord> {
        deal::create_deal(&self.tx, deal)
    }

    fn list_deals(&self, query: &DealQuery) -> Result<Vec<DealRecord>> {
        deal::list_deals(&self.tx, query)
    }

    #[cfg(test)]
    fn count_deals(&self) -> Result<usize> {
        deal::count_deals(&self.tx)
    }

    fn create_policy(&self, policy: &PolicyRecord) -> Result<bool> {
        policy::create_policy(&self.tx, policy)
    }

    fn list_policies(&self) -> Result<Vec<PolicyRecord>> {
        policy::list_policies(&self.tx)
    }

    fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}
