mod sqlite;

#[cfg(test)]
mod tests;

pub mod config;
pub mod factory;

use std::cell::RefCell;
use std::sync::Mutex;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlite::{Sqlite, SqliteTransaction};

/// Database connection trait that can create transactions
pub trait Connection<'a, T>
where
    T: Transaction + 'a,
{
    fn transaction(&'a mut self) -> Result<T>;
}

/// All database operations. Lookups return `Ok(None)` for a missing row,
/// errors are reserved for storage failures.
pub trait Transaction {
    // User operations
    /// Creates a user and returns it with the assigned id
    fn create_user(&self, user: UserRecord) -> Result<UserRecord>;
    fn get_user(&self, id: u64) -> Result<Option<UserRecord>>;
    fn get_user_by_name(&self, username: &str) -> Result<Option<UserRecord>>;
    /// Lists users ordered by id. An empty `ids` slice lists everyone.
    fn list_users(&self, ids: &[u64]) -> Result<Vec<UserRecord>>;
    fn update_user_password(&self, id: u64, hash: &str, must_reset: bool) -> Result<()>;

    // Game operations
    fn create_game(&self, game: GameRecord) -> Result<GameRecord>;
    fn get_game(&self, id: u64) -> Result<Option<GameRecord>>;
    fn list_games(&self, offset: u64, limit: u64) -> Result<Vec<GameRecord>>;

    // Deal operations
    fn create_deal(&self, deal: DealRecord) -> Result<DealRecord>;
    fn list_deals(&self, query: &DealQuery) -> Result<Vec<DealRecord>>;
    #[cfg(test)]
    fn count_deals(&self) -> Result<usize>;

    // Authorization policy operations
    /// Returns false when an identical `(policy_type, policy)` row already exists
    fn create_policy(&self, policy: &PolicyRecord) -> Result<bool>;
    /// Lists policies in insertion order
    fn list_policies(&self) -> Result<Vec<PolicyRecord>>;

    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    /// See [`crate::server::password`] for the format.
    pub password_hash: String,
    /// Set for invited users; login requires a new password first.
    pub must_reset_password: bool,
    pub create_time: u64,
    pub update_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRecord {
    pub id: u64,
    pub name: String,
    pub image_url: String,
    pub create_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealRecord {
    pub id: u64,
    pub game_id: u64,
    pub author_id: u64,
    /// Overrides the game's image when set
    pub image_url: Option<String>,
    pub link: String,
    pub price: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub create_time: u64,
}

/// Deal listing filter, ordered by start date.
#[derive(Debug, Clone)]
pub struct DealQuery {
    pub offset: u64,
    pub limit: u64,
    /// Include deals whose start date is still in the future
    pub before_start: bool,
    /// Include deals whose end date has passed
    pub expired: bool,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRecord {
    pub id: u64,
    pub logical_name: String,
    pub policy_type: String,
    pub policy: Vec<String>,
}

pub struct Database {
    ctx: Mutex<DatabaseContext>,
}

pub enum UnionConnection {
    Sqlite(Sqlite),
}

enum UnionTransaction<'a> {
    Sqlite(SqliteTransaction<'a>),
}

struct DatabaseContext {
    conn: RefCell<UnionConnection>,
}

impl Database {
    pub fn new(conn: UnionConnection) -> Self {
        Self {
            ctx: Mutex::new(DatabaseContext {
                conn: RefCell::new(conn),
            }),
        }
    }

    /// Runs `f` inside a transaction. The transaction is committed when `f`
    /// succeeds and rolled back when it fails.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        let ctx = match self.ctx.lock() {
            Ok(ctx) => ctx,
            Err(e) => bail!("failed to lock database: {e:#}"),
        };
        let mut conn = ctx.conn.borrow_mut();
        let tx = conn.transaction()?;

        let result = f(&tx);

        if result.is_ok() {
            tx.commit()
        } else {
            tx.rollback()
        }?;

        result
    }

    #[cfg(test)]
    pub fn new_test() -> Self {
        let sqlite = Sqlite::memory().unwrap();
        Self::new(UnionConnection::Sqlite(sqlite))
    }
}

impl<'a> Connection<'a, UnionTransaction<'a>> for UnionConnection {
    fn transaction(&'a mut self) -> Result<UnionTransaction<'a>> {
        match self {
            UnionConnection::Sqlite(sqlite) => sqlite.transaction().map(UnionTransaction::Sqlite),
        }
    }
}

impl Transaction for UnionTransaction<'_> {
    fn create_user(&self, user: UserRecord) -> Result<UserRecord> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.create_user(user),
        }
    }

    fn get_user(&self, id: u64) -> Result<Option<UserRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.get_user(id),
        }
    }

    fn get_user_by_name(&self, username: &str) -> Result<Option<UserRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.get_user_by_name(username),
        }
    }

    fn list_users(&self, ids: &[u64]) -> Result<Vec<UserRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.list_users(ids),
        }
    }

    fn update_user_password(&self, id: u64, hash: &str, must_reset: bool) -> Result<()> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.update_user_password(id, hash, must_reset),
        }
    }

    fn create_game(&self, game: GameRecord) -> Result<GameRecord> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.create_game(game),
        }
    }

    fn get_game(&self, id: u64) -> Result<Option<GameRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.get_game(id),
        }
    }

    fn list_games(&self, offset: u64, limit: u64) -> Result<Vec<GameRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.list_games(offset, limit),
        }
    }

    fn create_deal(&self, deal: DealRecord) -> Result<DealRecord> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.create_deal(deal),
        }
    }

    fn list_deals(&self, query: &DealQuery) -> Result<Vec<DealRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.list_deals(query),
        }
    }

    #[cfg(test)]
    fn count_deals(&self) -> Result<usize> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.count_deals(),
        }
    }

    fn create_policy(&self, policy: &PolicyRecord) -> Result<bool> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.create_policy(policy),
        }
    }

    fn list_policies(&self) -> Result<Vec<PolicyRecord>> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.list_policies(),
        }
    }

    fn commit(self) -> Result<()> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.commit(),
        }
    }

    fn rollback(self) -> Result<()> {
        match self {
            UnionTransaction::Sqlite(tx) => tx.rollback(),
        }
    }
}
