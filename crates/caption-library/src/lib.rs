//! Durable record of every caption the service has produced.

mod error;

pub use error::{LibraryError, LibraryResult};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Fields supplied by the caller; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewCaption {
    pub image_filename: String,
    pub short_caption: String,
    pub long_caption: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionRecord {
    pub id: i64,
    pub image_filename: String,
    pub short_caption: String,
    pub long_caption: String,
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed caption catalog. Safe to share between request handlers.
pub struct CaptionLibrary {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl CaptionLibrary {
    /// Open or create the database at `db_path`, creating parent directories.
    pub fn open(db_path: impl AsRef<Path>) -> LibraryResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        tracing::info!("caption database opened at {}", db_path.display());

        let library = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        library.init_schema()?;
        Ok(library)
    }

    pub fn open_in_memory() -> LibraryResult<Self> {
        let library = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    fn init_schema(&self) -> LibraryResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS captions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                image_filename  TEXT NOT NULL,
                short_caption   TEXT NOT NULL,
                long_caption    TEXT NOT NULL,
                confidence      REAL,
                created_at      INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_captions_created_at
             ON captions(created_at DESC)",
            [],
        )?;
        Ok(())
    }

    fn conn(&self) -> LibraryResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LibraryError::Poisoned)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn insert(&self, caption: NewCaption) -> LibraryResult<CaptionRecord> {
        // stored with millisecond precision
        let created_at = Utc::now().trunc_subsecs(3);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO captions (image_filename, short_caption, long_caption, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                caption.image_filename,
                caption.short_caption,
                caption.long_caption,
                caption.confidence,
                created_at.timestamp_millis(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(CaptionRecord {
            id,
            image_filename: caption.image_filename,
            short_caption: caption.short_caption,
            long_caption: caption.long_caption,
            confidence: caption.confidence,
            created_at,
        })
    }

    /// Most recent `limit` records, newest first.
    pub fn recent(&self, limit: u32) -> LibraryResult<Vec<CaptionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, image_filename, short_caption, long_caption, confidence, created_at
             FROM captions
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;

        let record_iter = stmt.query_map([limit], read_record)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }
        Ok(records)
    }

    pub fn count(&self) -> LibraryResult<i64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM captions", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<CaptionRecord> {
    let millis: i64 = row.get(5)?;
    let created_at = DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, millis))?;

    Ok(CaptionRecord {
        id: row.get(0)?,
        image_filename: row.get(1)?,
        short_caption: row.get(2)?,
        long_caption: row.get(3)?,
        confidence: row.get(4)?,
        created_at,
    })
}
