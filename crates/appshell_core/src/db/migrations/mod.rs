//! Schema steps for the `local_kv` table that backs durable client state.
//!
//! # Responsibility
//! - Bring a freshly created or older state file up to the layout the
//!   key-value stores read and write.
//! - Refuse files written by a newer build instead of guessing at them.
//!
//! # Invariants
//! - Steps only add to the layout; existing keys and values are never
//!   rewritten, so a dismissal anchor survives every upgrade.
//! - The schema version lives in `PRAGMA user_version` and is bumped in the
//!   same transaction as the step that introduced it.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    summary: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    summary: "create local_kv",
    sql: include_str!("0001_local_kv.sql"),
}];

/// Versions observed before and after an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaUpgrade {
    pub from: u32,
    pub to: u32,
}

impl SchemaUpgrade {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Newest `local_kv` layout this build understands.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Reads the layout version recorded in the state file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Runs every step newer than the recorded version, all or nothing.
pub fn upgrade_schema(conn: &mut Connection) -> DbResult<SchemaUpgrade> {
    let from = schema_version(conn)?;
    let to = latest_version();
    if from > to {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: to,
        });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > from)
        .collect();
    if pending.is_empty() {
        return Ok(SchemaUpgrade { from, to: from });
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=kv_schema_step module=db status=ok version={} summary=\"{}\"",
            step.version, step.summary
        );
    }
    tx.commit()?;

    Ok(SchemaUpgrade { from, to })
}
