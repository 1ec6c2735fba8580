//! Schema migrations for the history database.
//!
//! Applied versions are recorded in `_migrations`; each migration runs at
//! most once. Column additions are skipped when the column already exists,
//! so databases created by older deployments upgrade in place.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    guard: Guard,
}

/// Precondition checked before a migration's SQL runs.
enum Guard {
    None,
    /// Skip the SQL when `table.column` already exists.
    ColumnMissing {
        table: &'static str,
        column: &'static str,
    },
}

const HISTORY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_resume_history",
        sql: include_str!("sql/001_create_resume_history.sql"),
        guard: Guard::None,
    },
    Migration {
        version: 2,
        name: "add_processing_method",
        sql: include_str!("sql/002_add_processing_method.sql"),
        guard: Guard::ColumnMissing {
            table: "resume_history",
            column: "processing_method",
        },
    },
    Migration {
        version: 3,
        name: "index_processed_at",
        sql: include_str!("sql/003_index_processed_at.sql"),
        guard: Guard::None,
    },
];

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Brings the schema up to the latest version. Each migration and its
/// ledger entry commit together.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(LEDGER_DDL)?;

    let applied: u32 = conn.query_row(
        "SELECT IFNULL(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in HISTORY_MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    let needed = match migration.guard {
        Guard::None => true,
        Guard::ColumnMissing { table, column } => !column_exists(&tx, table, column)?,
    };

    if needed {
        log::info!("Applying history schema v{} ({})", migration.version, migration.name);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::debug!("Schema v{} already present, recording only", migration.version);
    }

    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let valid_identifier = !table.is_empty()
        && table.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !valid_identifier {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("refusing to inspect table '{}'", table),
        });
    }

    let mut stmt = conn.prepare(&format!("SELECT name FROM pragma_table_info('{}')", table))?;
    let mut names = stmt.query([])?;
    while let Some(row) = names.next()? {
        if row.get::<_, String>(0)? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
