//! SQLite checkpoint store

use super::traits::{
    CheckpointId, CheckpointKey, CheckpointStore, OpenStore, RecordKind, StorageError,
    StorageResult,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed checkpoint store
///
/// One table of immutable records keyed by `(id, kind)`. Thread-safe via
/// an internal mutex on the connection.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT NOT NULL,
                kind TEXT NOT NULL,
                topic_hash TEXT NOT NULL,
                round INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                payload BLOB NOT NULL,
                PRIMARY KEY (id, kind)
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoints_topic
                ON checkpoints(topic_hash, created_at);

            -- Concurrent reads while a save is in flight
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn format_timestamp(ts: &DateTime<Utc>) -> String {
        // Fixed width so lexical order is chronological order
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }
}

impl OpenStore for SqliteCheckpointStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn put(&self, key: &CheckpointKey, kind: RecordKind, payload: &[u8]) -> StorageResult<()> {
        let conn = self.conn()?;
        let id = key.id();
        let result = conn.execute(
            "INSERT INTO checkpoints (id, kind, topic_hash, round, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                kind.as_str(),
                key.topic_hash,
                key.round,
                Self::format_timestamp(&key.timestamp),
                payload,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::AlreadyExists(format!("{}/{}", id, kind.as_str())))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &CheckpointId, kind: RecordKind) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM checkpoints WHERE id = ?1 AND kind = ?2",
                params![id.as_str(), kind.as_str()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn list(&self, topic_hash: &str) -> StorageResult<Vec<CheckpointKey>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT topic_hash, round, created_at FROM checkpoints
             WHERE topic_hash = ?1
             GROUP BY id
             ORDER BY created_at DESC, round DESC",
        )?;
        let rows = stmt
            .query_map(params![topic_hash], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(hash, round, created_at)| {
                Ok(CheckpointKey::new(hash, round, Self::parse_timestamp(&created_at)?))
            })
            .collect()
    }

    fn delete(&self, id: &CheckpointId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM checkpoints WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }
}
