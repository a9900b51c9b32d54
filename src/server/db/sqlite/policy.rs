use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, Connection, Transaction};

use crate::server::db::PolicyRecord;

// `policy` holds the tuple as a JSON string array. The unique index makes
// re-inserting an identical row a no-op.
const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS authorization_policy (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    logical_name TEXT NOT NULL,
    policy_type TEXT NOT NULL,
    policy TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_authorization_policy_row
    ON authorization_policy(policy_type, policy);
"#;

pub fn create_policy_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

pub fn create_policy(tx: &Transaction, policy: &PolicyRecord) -> Result<bool> {
    let data = serde_json::to_string(&policy.policy).context("encode policy tuple")?;
    let sql = r#"
    INSERT OR IGNORE INTO authorization_policy (logical_name, policy_type, policy)
    VALUES (?, ?, ?)
    "#;
    debug!(
        "Database create_policy: {sql}, {}, {}, {data}",
        policy.logical_name, policy.policy_type
    );
    let count = tx.execute(sql, params![policy.logical_name, policy.policy_type, data])?;
    Ok(count > 0)
}

pub fn list_policies(tx: &Transaction) -> Result<Vec<PolicyRecord>> {
    let mut stmt = tx.prepare(
        "SELECT id, logical_name, policy_type, policy FROM authorization_policy ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut policies = Vec::with_capacity(rows.len());
    for (id, logical_name, policy_type, data) in rows {
        let policy: Vec<String> = serde_json::from_str(&data)
            .with_context(|| format!("decode policy row {id}"))?;
        policies.push(PolicyRecord {
            id,
            logical_name,
            policy_type,
            policy,
        });
    }
    Ok(policies)
}
