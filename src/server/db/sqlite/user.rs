use anyhow::Result;
use chrono::Local;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};

use crate::server::db::UserRecord;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    must_reset_password INTEGER NOT NULL,
    create_time INTEGER NOT NULL,
    update_time INTEGER NOT NULL
);
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, username, password_hash, must_reset_password, create_time, update_time FROM user";

pub fn create_user_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

pub fn create_user(tx: &Transaction, mut user: UserRecord) -> Result<UserRecord> {
    let now = Local::now().timestamp() as u64;
    let sql = r#"
    INSERT INTO user (username, password_hash, must_reset_password, create_time, update_time)
    VALUES (?, ?, ?, ?, ?)
    "#;
    debug!("Database create_user: {sql}, {}", user.username);
    tx.execute(
        sql,
        params![
            user.username,
            user.password_hash,
            user.must_reset_password,
            now,
            now
        ],
    )?;
    user.id = tx.last_insert_rowid() as u64;
    user.create_time = now;
    user.update_time = now;
    Ok(user)
}

pub fn get_user(tx: &Transaction, id: u64) -> Result<Option<UserRecord>> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
    let mut stmt = tx.prepare(&sql)?;
    let user = stmt.query_row(params![id], parse_row).optional()?;
    Ok(user)
}

pub fn get_user_by_name(tx: &Transaction, username: &str) -> Result<Option<UserRecord>> {
    let sql = format!("{SELECT_COLUMNS} WHERE username = ?");
    let mut stmt = tx.prepare(&sql)?;
    let user = stmt.query_row(params![username], parse_row).optional()?;
    Ok(user)
}

pub fn list_users(tx: &Transaction, ids: &[u64]) -> Result<Vec<UserRecord>> {
    let mut sql = String::from(SELECT_COLUMNS);
    let mut values = Vec::with_capacity(ids.len());
    if !ids.is_empty() {
        let placeholders = vec!["?"; ids.len()].join(", ");
        sql.push_str(&format!(" WHERE id IN ({placeholders})"));
        values.extend(ids.iter().map(|id| Value::Integer(*id as i64)));
    }
    sql.push_str(" ORDER BY id ASC");

    debug!("Database list_users: {sql}, {values:?}");
    let mut stmt = tx.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(values), parse_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn update_user_password(tx: &Transaction, id: u64, hash: &str, must_reset: bool) -> Result<()> {
    let now = Local::now().timestamp() as u64;
    tx.execute(
        "UPDATE user SET password_hash = ?, must_reset_password = ?, update_time = ? WHERE id = ?",
        params![hash, must_reset, now, id],
    )?;
    Ok(())
}

fn parse_row(row: &Row) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        must_reset_password: row.get(3)?,
        create_time: row.get(4)?,
        update_time: row.get(5)?,
    })
}
