//! History repository: append, list, detail and delete for `resume_history`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;
use serde_json::Value;

use super::{Database, DatabaseError};

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

/// A row to append. `resume_data` is the JSON payload as stored.
#[derive(Debug, Clone)]
pub struct NewHistoryRow {
    pub task_id: Option<String>,
    pub filename: String,
    pub processed_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub resume_data: Value,
    pub file_size: u64,
    pub status: &'static str,
    pub original_file_type: String,
    pub processing_method: String,
    pub error: Option<String>,
}

/// A stored row.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: i64,
    pub task_id: Option<String>,
    pub filename: String,
    pub processed_at: String,
    pub user_id: Option<String>,
    pub resume_data: String,
    pub file_size: i64,
    pub status: String,
    pub original_file_type: String,
    pub processing_method: String,
    pub error: Option<String>,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            filename: row.get("filename")?,
            processed_at: row.get("processed_at")?,
            user_id: row.get("user_id")?,
            resume_data: row.get("resume_data")?,
            file_size: row.get("file_size")?,
            status: row.get("status")?,
            original_file_type: row.get("original_file_type")?,
            processing_method: row.get("processing_method")?,
            error: row.get("error")?,
        })
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            id: self.id,
            filename: self.filename.clone(),
            processed_at: self.processed_at.clone(),
            file_size: self.file_size,
            status: self.status.clone(),
            original_file_type: self.original_file_type.clone(),
            processing_method: self.processing_method.clone(),
        }
    }

    pub fn detail(&self) -> Result<HistoryDetail, DatabaseError> {
        let resume_data = serde_json::from_str(&self.resume_data)
            .map_err(|source| DatabaseError::Payload { id: self.id, source })?;
        Ok(HistoryDetail {
            id: self.id,
            filename: self.filename.clone(),
            processed_at: self.processed_at.clone(),
            file_size: self.file_size,
            status: self.status.clone(),
            original_file_type: self.original_file_type.clone(),
            processing_method: self.processing_method.clone(),
            resume_data,
        })
    }
}

/// Listing entry, without the payload.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub id: i64,
    pub filename: String,
    pub processed_at: String,
    pub file_size: i64,
    pub status: String,
    pub original_file_type: String,
    pub processing_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryDetail {
    pub id: i64,
    pub filename: String,
    pub processed_at: String,
    pub file_size: i64,
    pub status: String,
    pub original_file_type: String,
    pub processing_method: String,
    pub resume_data: Value,
}

/// Appends a row and returns its id.
pub fn insert(db: &Database, row: &NewHistoryRow) -> Result<i64, DatabaseError> {
    let payload = row.resume_data.to_string();
    let file_size = i64::try_from(row.file_size).unwrap_or(i64::MAX);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO resume_history (task_id, filename, processed_at, user_id, resume_data,
             file_size, status, original_file_type, processing_method, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.task_id,
                row.filename,
                row.processed_at.to_rfc3339(),
                row.user_id,
                payload,
                file_size,
                row.status,
                row.original_file_type,
                row.processing_method,
                row.error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<HistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM resume_history WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], HistoryRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Rows written for one task, oldest first.
pub fn find_by_task(db: &Database, task_id: &str) -> Result<Vec<HistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM resume_history WHERE task_id = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![task_id], HistoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Newest first, paginated.
pub fn list(db: &Database, skip: u64, limit: u64) -> Result<Vec<HistoryRow>, DatabaseError> {
    let skip = i64::try_from(skip).unwrap_or(i64::MAX);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM resume_history ORDER BY processed_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit, skip], HistoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns whether a row was deleted.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM resume_history WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM resume_history", [], |r| r.get(0))?;
        Ok(count)
    })
}
