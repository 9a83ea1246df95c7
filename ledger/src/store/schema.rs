//! Ledger database schema.
//!
//! The version lives in SQLite's `user_version` pragma. `MIGRATIONS[n]`
//! takes a database from version `n` to `n + 1`; pending steps run in one
//! transaction on open.

use rusqlite::Connection;
use tracing::{debug, info};

use super::sqlite::db_err;
use crate::types::{LedgerError, Result};

const MIGRATIONS: &[&str] = &[CREATE_LEDGER_TABLES];

/// Version a fully migrated database reports.
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// Refuses a database written by a newer build.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(LedgerError::StoreUnavailable(format!(
            "Database schema v{} is newer than supported v{}",
            current, SCHEMA_VERSION
        )));
    }
    if current == SCHEMA_VERSION {
        debug!(version = current, "Ledger schema up to date");
        return Ok(());
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("Failed to begin migration"))?;
    for (from, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        info!(from, to = from + 1, "Migrating ledger schema");
        tx.execute_batch(sql).map_err(db_err("Migration failed"))?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(db_err("Failed to record schema version"))?;
    tx.commit().map_err(db_err("Failed to commit migration"))
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(db_err("Failed to read schema version"))
}

const CREATE_LEDGER_TABLES: &str = r#"
-- One row per user, created on first contact
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY NOT NULL,
    day TEXT NOT NULL,
    daily_count INTEGER NOT NULL DEFAULT 0,
    premium_until INTEGER NOT NULL DEFAULT 0,
    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    referral_code TEXT NOT NULL,
    referral_count INTEGER NOT NULL DEFAULT 0,
    last_request_at INTEGER NOT NULL DEFAULT 0
);

-- Append-only purchase log; payment_id is the idempotency key
CREATE TABLE IF NOT EXISTS payments (
    payment_id TEXT PRIMARY KEY NOT NULL,
    user_id INTEGER NOT NULL,
    product_code TEXT NOT NULL,
    amount INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

-- An invitee is attributed to at most one inviter
CREATE TABLE IF NOT EXISTS referrals (
    invitee_id INTEGER PRIMARY KEY NOT NULL,
    inviter_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);
CREATE INDEX IF NOT EXISTS idx_referrals_inviter ON referrals(inviter_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn table_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'payments', 'referrals')",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(table_count(&conn), 3);
    }

    #[test]
    fn test_newer_database_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();

        let err = init_schema(&conn).unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
        assert_eq!(table_count(&conn), 0);
    }
}
