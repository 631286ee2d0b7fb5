use super::{StoreError, StoreResult};
use rusqlite::{Connection, TransactionBehavior};

/// Highest schema version this build knows how to create.
pub const SCHEMA_VERSION: i64 = 3;

const V1_RECORDS: &str = "
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'unset',
    attempt_count INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL DEFAULT '{}',
    processed_at TEXT,
    last_updated TEXT NOT NULL
);
";

const V2_STATUS_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
";

const V3_PROCESSED_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_records_processed_at ON records(processed_at);
";

pub fn schema_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Brings the database up to `SCHEMA_VERSION`. Each step only adds tables,
/// columns, or indices, and is safe to re-run.
///
/// The migration runs under an exclusive transaction; a concurrent holder of
/// that lock surfaces as `StoreError::Blocked` once the busy timeout expires.
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
    let mut current: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        tx.execute_batch(V1_RECORDS)?;
        tx.execute_batch("PRAGMA user_version = 1")?;
        current = 1;
    }

    if current < 2 {
        tx.execute_batch(V2_STATUS_INDEX)?;
        tx.execute_batch("PRAGMA user_version = 2")?;
        current = 2;
    }

    if current < 3 {
        if !column_exists(&tx, "records", "first_seen_at")? {
            tx.execute_batch("ALTER TABLE records ADD COLUMN first_seen_at TEXT")?;
        }
        tx.execute(
            "UPDATE records SET first_seen_at = last_updated WHERE first_seen_at IS NULL",
            [],
        )?;
        tx.execute_batch(V3_PROCESSED_INDEX)?;
        tx.execute_batch("PRAGMA user_version = 3")?;
    }

    tx.commit()?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
