//! Schema migrations.
//!
//! Versions applied so far are recorded in `_migrations`. Each pending
//! script runs in its own transaction together with its bookkeeping row, so
//! a failed script leaves the schema at the previous version.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Never edit an entry once released; append instead.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_jobs",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Migration {
        version: 2,
        name: "create_topics",
        sql: include_str!("sql/002_create_topics.sql"),
    },
    Migration {
        version: 3,
        name: "create_generation_results",
        sql: include_str!("sql/003_create_generation_results.sql"),
    },
];

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}

/// Brings the schema up to the latest version. Returns how many scripts ran.
pub fn run_all(conn: &Connection) -> Result<usize, DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!("Applying migration {} ({})", migration.version, migration.name);

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;

        applied += 1;
    }

    Ok(applied)
}
