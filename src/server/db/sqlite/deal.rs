use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};

use crate::server::db::{DealQuery, DealRecord};

// Dates are stored as unix seconds.
const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS deal (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES game(id),
    author_id INTEGER NOT NULL REFERENCES user(id),
    image_url TEXT,
    link TEXT NOT NULL,
    price REAL NOT NULL,
    start_date INTEGER NOT NULL,
    end_date INTEGER NOT NULL,
    create_time INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deal_start_date ON deal(start_date);
"#;

pub fn create_deal_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

pub fn create_deal(tx: &Transaction, mut deal: DealRecord) -> Result<DealRecord> {
    let now = Local::now().timestamp() as u64;
    let sql = r#"
    INSERT INTO deal (game_id, author_id, image_url, link, price, start_date, end_date, create_time)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#;
    debug!("Database create_deal: {sql}, game {}", deal.game_id);
    tx.execute(
        sql,
        params![
            deal.game_id,
            deal.author_id,
            deal.image_url,
            deal.link,
            deal.price,
            deal.start_date.timestamp(),
            deal.end_date.timestamp(),
            now,
        ],
    )?;
    deal.id = tx.last_insert_rowid() as u64;
    deal.create_time = now;
    Ok(deal)
}

pub fn list_deals(tx: &Transaction, query: &DealQuery) -> Result<Vec<DealRecord>> {
    let mut sql = String::from(
        "SELECT id, game_id, author_id, image_url, link, price, start_date, end_date, create_time FROM deal",
    );
    let mut conds = Vec::new();
    let mut values = Vec::new();
    let now = query.now.timestamp();
    if !query.before_start {
        conds.push("start_date <= ?");
        values.push(Value::Integer(now));
    }
    if !query.expired {
        conds.push("end_date >= ?");
        values.push(Value::Integer(now));
    }
    if !conds.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }
    sql.push_str(" ORDER BY start_date ASC, id ASC LIMIT ? OFFSET ?");
    values.push(Value::Integer(query.limit as i64));
    values.push(Value::Integer(query.offset as i64));

    debug!("Database list_deals: {sql}, {values:?}");
    let mut stmt = tx.prepare(&sql)?;
    let deals = stmt
        .query_map(params_from_iter(values), parse_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(deals)
}

#[cfg(test)]
pub fn count_deals(tx: &Transaction) -> Result<usize> {
    let count: i64 = tx.query_row("SELECT COUNT(*) FROM deal", [], |row| row.get(0))?;
    Ok(count as usize)
}

fn parse_row(row: &Row) -> rusqlite::Result<DealRecord> {
    Ok(DealRecord {
        id: row.get(0)?,
        game_id: row.get(1)?,
        author_id: row.get(2)?,
        image_url: row.get(3)?,
        link: row.get(4)?,
        price: row.get(5)?,
        start_date: parse_date(row, 6)?,
        end_date: parse_date(row, 7)?,
        create_time: row.get(8)?,
    })
}

fn parse_date(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(
        idx,
        secs,
    ))
}
