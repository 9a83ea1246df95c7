//! SQLite ledger store.
//!
//! One connection behind a mutex; every unit runs in an IMMEDIATE
//! transaction so the read, the plan and the write commit together or not at
//! all. The guard is never held across an await.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info};

use super::{schema, LedgerStats, LedgerStore, PaymentAppend, Plan, ReferralAppend};
use crate::reset::roll_day;
use crate::types::{
    InvalidReferral, LedgerError, PaymentRecord, ReferralEdge, Result, UserAccount, UserId,
};

const USER_COLUMNS: &str =
    "id, day, daily_count, premium_until, balance, referral_code, referral_count, last_request_at";

pub(super) fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> LedgerError + '_ {
    move |e| LedgerError::StoreUnavailable(format!("{}: {}", context, e))
}

fn to_sql_amount(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| LedgerError::InvalidMutation(format!("amount {} out of range", value)))
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAccount> {
    let balance: i64 = row.get(4)?;
    Ok(UserAccount {
        id: UserId(row.get(0)?),
        day: row.get(1)?,
        daily_count: row.get(2)?,
        premium_until: row.get(3)?,
        balance: u64::try_from(balance).unwrap_or(0),
        referral_code: row.get(5)?,
        referral_count: row.get(6)?,
        last_request_at: row.get(7)?,
    })
}

fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentRecord> {
    let amount: i64 = row.get(3)?;
    Ok(PaymentRecord {
        payment_id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        product_code: row.get(2)?,
        amount: u64::try_from(amount).unwrap_or(0),
        timestamp: row.get(4)?,
    })
}

fn select_account(conn: &Connection, user_id: UserId) -> Result<Option<UserAccount>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        params![user_id.0],
        row_to_account,
    )
    .optional()
    .map_err(db_err("Failed to read account"))
}

fn insert_account(conn: &Connection, account: &UserAccount) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            USER_COLUMNS
        ),
        params![
            account.id.0,
            account.day,
            account.daily_count,
            account.premium_until,
            to_sql_amount(account.balance)?,
            account.referral_code,
            account.referral_count,
            account.last_request_at,
        ],
    )
    .map_err(db_err("Failed to create account"))?;
    Ok(())
}

fn save_account(conn: &Connection, account: &UserAccount) -> Result<()> {
    conn.execute(
        "UPDATE users SET day = ?2, daily_count = ?3, premium_until = ?4, balance = ?5,
                referral_count = ?6, last_request_at = ?7
         WHERE id = ?1",
        params![
            account.id.0,
            account.day,
            account.daily_count,
            account.premium_until,
            to_sql_amount(account.balance)?,
            account.referral_count,
            account.last_request_at,
        ],
    )
    .map_err(db_err("Failed to write account"))?;
    Ok(())
}

/// Read the row (creating it if absent) and move it onto `today`.
fn load_or_create(conn: &Connection, user_id: UserId, today: &str) -> Result<UserAccount> {
    match select_account(conn, user_id)? {
        Some(mut account) => {
            if roll_day(&mut account, today) {
                save_account(conn, &account)?;
            }
            Ok(account)
        }
        None => {
            debug!(user_id = %user_id, "Creating account");
            let account = UserAccount::new(user_id, today);
            insert_account(conn, &account)?;
            Ok(account)
        }
    }
}

/// Plan against `account`, apply, and write the result back.
fn plan_and_save(conn: &Connection, account: &mut UserAccount, plan: &mut Plan<'_>) -> Result<()> {
    let mutation = plan(&*account)?;
    mutation.apply(account)?;
    save_account(conn, account)
}

/// SQLite-backed ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening ledger database at {:?}", path);

        let conn = Connection::open(path).map_err(db_err("Failed to open SQLite"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;")
            .map_err(db_err("Failed to set PRAGMA"))?;

        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory ledger database");
        let conn = Connection::open_in_memory().map_err(db_err("Failed to open in-memory SQLite"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LedgerError::StoreUnavailable(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run `f` in one IMMEDIATE transaction, committing only if it succeeds.
    fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| LedgerError::StoreUnavailable(format!("Lock poisoned: {}", e)))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err("Failed to begin transaction"))?;

        // Dropping an uncommitted transaction rolls it back
        let value = f(&tx)?;
        tx.commit().map_err(db_err("Failed to commit"))?;
        Ok(value)
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, user_id: UserId, today: &str) -> Result<UserAccount> {
        self.with_tx(|tx| load_or_create(tx, user_id, today))
    }

    async fn find(&self, user_id: UserId) -> Result<Option<UserAccount>> {
        self.with_conn(|conn| select_account(conn, user_id))
    }

    async fn update(&self, user_id: UserId, today: &str, plan: &mut Plan<'_>) -> Result<UserAccount> {
        self.with_tx(|tx| {
            let mut account = load_or_create(tx, user_id, today)?;
            plan_and_save(tx, &mut account, plan)?;
            Ok(account)
        })
    }

    async fn append_referral(
        &self,
        edge: ReferralEdge,
        today: &str,
        plan: &mut Plan<'_>,
    ) -> Result<ReferralAppend> {
        self.with_tx(|tx| {
            let mut inviter = select_account(tx, edge.inviter_id)?
                .ok_or(InvalidReferral::UnknownInviter(edge.inviter_id))?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT inviter_id FROM referrals WHERE invitee_id = ?1",
                    params![edge.invitee_id.0],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err("Failed to read referral"))?;

            if let Some(existing) = existing {
                if existing == edge.inviter_id.0 {
                    return Ok(ReferralAppend::AlreadyRecorded);
                }
                return Err(InvalidReferral::AlreadyReferred {
                    invitee: edge.invitee_id,
                    inviter: UserId(existing),
                }
                .into());
            }

            roll_day(&mut inviter, today);
            plan_and_save(tx, &mut inviter, plan)?;
            tx.execute(
                "INSERT INTO referrals (invitee_id, inviter_id, created_at) VALUES (?1, ?2, ?3)",
                params![edge.invitee_id.0, edge.inviter_id.0, edge.created_at],
            )
            .map_err(db_err("Failed to record referral"))?;

            Ok(ReferralAppend::Recorded(inviter))
        })
    }

    async fn append_payment(
        &self,
        record: PaymentRecord,
        today: &str,
        plan: &mut Plan<'_>,
    ) -> Result<PaymentAppend> {
        self.with_tx(|tx| {
            let mut account = load_or_create(tx, record.user_id, today)?;

            let seen: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM payments WHERE payment_id = ?1)",
                    params![record.payment_id],
                    |row| row.get(0),
                )
                .map_err(db_err("Failed to read payment"))?;
            if seen {
                return Ok(PaymentAppend::Duplicate(account));
            }

            plan_and_save(tx, &mut account, plan)?;
            tx.execute(
                "INSERT INTO payments (payment_id, user_id, product_code, amount, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.payment_id,
                    record.user_id.0,
                    record.product_code,
                    to_sql_amount(record.amount)?,
                    record.timestamp,
                ],
            )
            .map_err(db_err("Failed to record payment"))?;

            Ok(PaymentAppend::Applied(account))
        })
    }

    async fn referral_of(&self, invitee: UserId) -> Result<Option<ReferralEdge>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT inviter_id, invitee_id, created_at FROM referrals WHERE invitee_id = ?1",
                params![invitee.0],
                |row| {
                    Ok(ReferralEdge {
                        inviter_id: UserId(row.get(0)?),
                        invitee_id: UserId(row.get(1)?),
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(db_err("Failed to read referral"))
        })
    }

    async fn payments_of(&self, user_id: UserId) -> Result<Vec<PaymentRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT payment_id, user_id, product_code, amount, timestamp
                     FROM payments WHERE user_id = ?1 ORDER BY timestamp, rowid",
                )
                .map_err(db_err("Failed to prepare query"))?;
            let rows = stmt
                .query_map(params![user_id.0], row_to_payment)
                .map_err(db_err("Query failed"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err("Query failed"))
        })
    }

    async fn stats(&self) -> Result<LedgerStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(db_err("Query failed"))?;
                Ok(u64::try_from(n).unwrap_or(0))
            };

            let mut stats = LedgerStats {
                users: count("SELECT COUNT(*) FROM users")?,
                payments: count("SELECT COUNT(*) FROM payments")?,
                payment_total: count("SELECT COALESCE(SUM(amount), 0) FROM payments")?,
                referrals: count("SELECT COUNT(*) FROM referrals")?,
                ..Default::default()
            };

            let mut stmt = conn
                .prepare("SELECT product_code, COUNT(*) FROM payments GROUP BY product_code")
                .map_err(db_err("Failed to prepare query"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(db_err("Query failed"))?;
            for row in rows {
                let (product, n) = row.map_err(db_err("Query failed"))?;
                stats
                    .payments_by_product
                    .insert(product, u64::try_from(n).unwrap_or(0));
            }

            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::AccountMutation;

    const TODAY: &str = "2026-10-18";

    #[tokio::test]
    async fn test_update_persists() {
        let store = SqliteLedger::open_in_memory().unwrap();
        store
            .apply_mutation(
                UserId(5),
                TODAY,
                AccountMutation::none().credit(3).stamp_request(1_000).count_answer(),
            )
            .await
            .unwrap();

        let account = store.find(UserId(5)).await.unwrap().unwrap();
        assert_eq!(account.balance, 3);
        assert_eq!(account.daily_count, 1);
        assert_eq!(account.last_request_at, 1_000);
        assert_eq!(account.referral_code, "ref5");
    }

    #[tokio::test]
    async fn test_failed_plan_rolls_back() {
        let store = SqliteLedger::open_in_memory().unwrap();
        let result = store
            .apply_mutation(UserId(5), TODAY, AccountMutation::none().debit_credit())
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidMutation(_))));

        // The row created inside the aborted unit is gone too
        assert!(store.find(UserId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_day_rollover_is_written() {
        let store = SqliteLedger::open_in_memory().unwrap();
        store
            .apply_mutation(UserId(1), "2026-10-17", AccountMutation::none().count_answer())
            .await
            .unwrap();

        let account = store.get(UserId(1), TODAY).await.unwrap();
        assert_eq!(account.daily_count, 0);
        assert_eq!(store.find(UserId(1)).await.unwrap().unwrap().day, TODAY);
    }

    #[tokio::test]
    async fn test_referral_edges() {
        let store = SqliteLedger::open_in_memory().unwrap();
        store.get(UserId(1), TODAY).await.unwrap();
        store.get(UserId(3), TODAY).await.unwrap();

        let edge = |inviter: i64| ReferralEdge {
            inviter_id: UserId(inviter),
            invitee_id: UserId(2),
            created_at: 10,
        };
        let mut plan = |_: &UserAccount| -> Result<AccountMutation> {
            Ok(AccountMutation::none().count_referral(5).credit(2))
        };

        let first = store.append_referral(edge(1), TODAY, &mut plan).await.unwrap();
        assert!(matches!(first, ReferralAppend::Recorded(ref a) if a.balance == 2));

        let again = store.append_referral(edge(1), TODAY, &mut plan).await.unwrap();
        assert_eq!(again, ReferralAppend::AlreadyRecorded);

        let other = store.append_referral(edge(3), TODAY, &mut plan).await;
        assert!(matches!(
            other,
            Err(LedgerError::InvalidReferral(InvalidReferral::AlreadyReferred { .. }))
        ));

        assert_eq!(store.referral_of(UserId(2)).await.unwrap(), Some(edge(1)));
        assert_eq!(store.find(UserId(1)).await.unwrap().unwrap().referral_count, 1);
    }

    #[tokio::test]
    async fn test_payment_dedup_and_stats() {
        let store = SqliteLedger::open_in_memory().unwrap();
        let record = |id: &str, product: &str| PaymentRecord {
            payment_id: id.into(),
            user_id: UserId(8),
            product_code: product.into(),
            amount: 250,
            timestamp: 100,
        };
        let mut plan = |_: &UserAccount| -> Result<AccountMutation> { Ok(AccountMutation::none().credit(100)) };

        store.append_payment(record("a", "pro-pack-credits"), TODAY, &mut plan).await.unwrap();
        let dup = store
            .append_payment(record("a", "pro-pack-credits"), TODAY, &mut plan)
            .await
            .unwrap();
        assert!(matches!(dup, PaymentAppend::Duplicate(ref a) if a.balance == 100));

        store.append_payment(record("b", "premium-30d"), TODAY, &mut plan).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.payments, 2);
        assert_eq!(stats.payment_total, 500);
        assert_eq!(stats.payments_by_product.get("premium-30d"), Some(&1));
        assert_eq!(store.payments_of(UserId(8)).await.unwrap().len(), 2);
    }
}
