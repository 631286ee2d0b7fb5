use super::migrations;
use super::{BackendKind, RecordBackend, StoreError, StoreResult};
use crate::records::{ProfileFields, Record, RecordStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SELECT_COLUMNS: &str =
    "key, status, attempt_count, fields, processed_at, first_seen_at, last_updated";

/// Structured record backend on SQLite.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (creating if needed) and migrates the database. `busy_timeout`
    /// bounds how long lock conflicts are waited on.
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(busy_timeout)?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> StoreResult<i64> {
        let conn = self.lock()?;
        migrations::schema_version(&conn)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Structured
    }

    fn load(&self, key: &str) -> StoreResult<Option<Record>> {
        let conn = self.lock()?;
        select_one(&conn, key)
    }

    fn load_all(&self) -> StoreResult<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM records ORDER BY seq"
        ))?;
        let rows = stmt.query_map([], RawRow::read)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Record>) -> Record,
    ) -> StoreResult<Record> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = select_one(&tx, key)?;
        let mut record = apply(existing);
        record.key = key.to_string();
        let fields = serde_json::to_string(&record.fields)?;
        tx.execute(
            "INSERT INTO records (key, status, attempt_count, fields, processed_at, first_seen_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(key) DO UPDATE SET
                status = excluded.status,
                attempt_count = excluded.attempt_count,
                fields = excluded.fields,
                processed_at = excluded.processed_at,
                first_seen_at = excluded.first_seen_at,
                last_updated = excluded.last_updated",
            params![
                record.key,
                record.status.as_str(),
                record.attempt_count,
                fields,
                record.processed_at.map(|ts| ts.to_rfc3339()),
                record.first_seen_at.to_rfc3339(),
                record.last_updated.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM records WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn keys_with_status(&self, status: RecordStatus) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM records WHERE status = ?1 ORDER BY seq")?;
        let keys = stmt
            .query_map(params![status.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn select_one(conn: &Connection, key: &str) -> StoreResult<Option<Record>> {
    let raw = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM records WHERE key = ?1"),
            params![key],
            RawRow::read,
        )
        .optional()?;
    raw.map(RawRow::into_record).transpose()
}

/// Column values as stored, decoded into a `Record` outside the row callback
/// so decode failures keep their own error type.
struct RawRow {
    key: String,
    status: String,
    attempt_count: u32,
    fields: String,
    processed_at: Option<String>,
    first_seen_at: Option<String>,
    last_updated: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            status: row.get(1)?,
            attempt_count: row.get(2)?,
            fields: row.get(3)?,
            processed_at: row.get(4)?,
            first_seen_at: row.get(5)?,
            last_updated: row.get(6)?,
        })
    }

    fn into_record(self) -> StoreResult<Record> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.key.clone(),
            reason,
        };
        let status = RecordStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {:?}", self.status)))?;
        let fields: ProfileFields = serde_json::from_str(&self.fields)
            .map_err(|err| corrupt(format!("fields: {err}")))?;
        let last_updated = parse_timestamp(&self.last_updated).map_err(&corrupt)?;
        let processed_at = self
            .processed_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(&corrupt)?;
        let first_seen_at = match self.first_seen_at.as_deref() {
            Some(value) => parse_timestamp(value).map_err(&corrupt)?,
            None => last_updated,
        };
        Ok(Record {
            key: self.key.clone(),
            fields,
            status,
            attempt_count: self.attempt_count,
            processed_at,
            first_seen_at,
            last_updated,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| format!("timestamp {value:?}: {err}"))
}
