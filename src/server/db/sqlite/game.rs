use anyhow::Result;
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::server::db::GameRecord;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS game (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    image_url TEXT NOT NULL,
    create_time INTEGER NOT NULL
);
"#;

pub fn create_game_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

pub fn create_game(tx: &Transaction, mut game: GameRecord) -> Result<GameRecord> {
    let now = Local::now().timestamp() as u64;
    tx.execute(
        "INSERT INTO game (name, image_url, create_time) VALUES (?, ?, ?)",
        params![game.name, game.image_url, now],
    )?;
    game.id = tx.last_insert_rowid() as u64;
    game.create_time = now;
    Ok(game)
}

pub fn get_game(tx: &Transaction, id: u64) -> Result<Option<GameRecord>> {
    let mut stmt = tx.prepare("SELECT id, name, image_url, create_time FROM game WHERE id = ?")?;
    let game = stmt.query_row(params![id], parse_row).optional()?;
    Ok(game)
}

pub fn list_games(tx: &Transaction, offset: u64, limit: u64) -> Result<Vec<GameRecord>> {
    let mut stmt = tx.prepare(
        "SELECT id, name, image_url, create_time FROM game ORDER BY id ASC LIMIT ? OFFSET ?",
    )?;
    let games = stmt
        .query_map(params![limit, offset], parse_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(games)
}

fn parse_row(row: &Row) -> rusqlite::Result<GameRecord> {
    Ok(GameRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        image_url: row.get(2)?,
        create_time: row.get(3)?,
    })
}
