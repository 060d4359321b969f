/// Transaction Module
///
/// Transactions are plain control statements issued on a borrowed
/// connection. A transaction resolves exactly once: after a successful
/// `commit` or `rollback` every further call is a no-op.
use crate::core::db::connection::Connection;
use crate::core::{LitecallError, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

const COMMIT: &str = "END TRANSACTION";
const ROLLBACK: &str = "ROLLBACK";

/// When the engine takes its locks relative to `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionBehavior {
    /// Locks are taken on first read/write
    #[default]
    Deferred,
    /// A write lock is taken at `BEGIN`
    Immediate,
    /// An exclusive lock is taken at `BEGIN`
    Exclusive,
}

impl TransactionBehavior {
    pub fn keyword(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "DEFERRED",
            TransactionBehavior::Immediate => "IMMEDIATE",
            TransactionBehavior::Exclusive => "EXCLUSIVE",
        }
    }

    /// Statement issued when a transaction with this behavior begins.
    pub fn begin_sql(self) -> String {
        format!("BEGIN {} TRANSACTION", self.keyword())
    }
}

impl fmt::Display for TransactionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for TransactionBehavior {
    type Err = LitecallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" | "default" => Ok(TransactionBehavior::Deferred),
            "immediate" => Ok(TransactionBehavior::Immediate),
            "exclusive" => Ok(TransactionBehavior::Exclusive),
            other => Err(LitecallError::InvalidArgument(format!(
                "unknown transaction behavior '{other}'"
            ))),
        }
    }
}

/// Resolution applied when a still-active transaction is dropped outside of
/// a panic. A panic always rolls back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropBehavior {
    Rollback,
    #[default]
    Commit,
}

/// Lifecycle of a transaction. Anything other than `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// A transaction on a borrowed connection.
#[derive(Debug)]
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    behavior: TransactionBehavior,
    state: TransactionState,
    drop_behavior: DropBehavior,
}

impl<'conn> Transaction<'conn> {
    /// Issues `BEGIN <behavior> TRANSACTION`. On failure no transaction
    /// exists.
    pub(crate) fn begin(conn: &'conn Connection, behavior: TransactionBehavior) -> Result<Self> {
        let sql = behavior.begin_sql();
        debug!(%sql, "begin transaction");
        conn.execute(&sql)?;
        Ok(Transaction {
            conn,
            behavior,
            state: TransactionState::Active,
            drop_behavior: conn.drop_behavior(),
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn behavior(&self) -> TransactionBehavior {
        self.behavior
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state != TransactionState::Active
    }

    pub fn drop_behavior(&self) -> DropBehavior {
        self.drop_behavior
    }

    pub fn set_drop_behavior(&mut self, drop_behavior: DropBehavior) {
        self.drop_behavior = drop_behavior;
    }

    /// Issues `END TRANSACTION` if still active.
    ///
    /// If the statement fails the transaction stays active and the
    /// `Statement` error is returned.
    pub fn commit(&mut self) -> Result<()> {
        self.finish(COMMIT, TransactionState::Committed)
    }

    /// Issues `ROLLBACK` if still active.
    pub fn rollback(&mut self) -> Result<()> {
        self.finish(ROLLBACK, TransactionState::RolledBack)
    }

    fn finish(&mut self, sql: &str, resolved: TransactionState) -> Result<()> {
        if self.is_ended() {
            return Ok(());
        }
        self.conn.execute(sql)?;
        self.state = resolved;
        debug!(state = ?resolved, "transaction ended");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_ended() {
            return;
        }
        let outcome = if std::thread::panicking() {
            self.rollback()
        } else {
            match self.drop_behavior {
                DropBehavior::Rollback => self.rollback(),
                DropBehavior::Commit => self.commit(),
            }
        };
        if let Err(err) = outcome {
            warn!(error = %err, "resolving transaction on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_with_table() -> Connection {
        let mut conn = Connection::new();
        conn.open(":memory:").unwrap();
        conn.execute("CREATE TABLE t (x INTEGER)").unwrap();
        conn
    }

    fn count(conn: &Connection) -> usize {
        conn.query("SELECT x FROM t").unwrap().len()
    }

    #[test]
    fn test_begin_statements() {
        assert_eq!(TransactionBehavior::default(), TransactionBehavior::Deferred);
        assert_eq!(TransactionBehavior::Deferred.begin_sql(), "BEGIN DEFERRED TRANSACTION");
        assert_eq!(TransactionBehavior::Immediate.begin_sql(), "BEGIN IMMEDIATE TRANSACTION");
        assert_eq!(TransactionBehavior::Exclusive.begin_sql(), "BEGIN EXCLUSIVE TRANSACTION");
    }

    #[test]
    fn test_behavior_from_str() {
        assert_eq!("immediate".parse::<TransactionBehavior>().unwrap(), TransactionBehavior::Immediate);
        assert_eq!("Default".parse::<TransactionBehavior>().unwrap(), TransactionBehavior::Deferred);
        assert!(matches!(
            "eventually".parse::<TransactionBehavior>(),
            Err(LitecallError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_commit_is_applied_once() {
        let conn = open_with_table();
        let mut tx = conn.begin_transaction(TransactionBehavior::Immediate).unwrap();
        tx.connection().execute("INSERT INTO t VALUES (1)").unwrap();

        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        // A second END TRANSACTION would fail with "no transaction is active".
        tx.commit().unwrap();
        tx.rollback().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        drop(tx);

        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_rollback_discards_changes() {
        let conn = open_with_table();
        let mut tx = conn.transaction().unwrap();
        assert_eq!(tx.behavior(), TransactionBehavior::Deferred);
        tx.connection().execute("INSERT INTO t VALUES (1)").unwrap();
        tx.rollback().unwrap();
        assert!(tx.is_ended());
        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        drop(tx);

        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_drop_behavior() {
        let conn = open_with_table();
        {
            let tx = conn.begin_transaction(TransactionBehavior::Deferred).unwrap();
            assert_eq!(tx.drop_behavior(), DropBehavior::Commit);
            tx.connection().execute("INSERT INTO t VALUES (1)").unwrap();
        }
        assert_eq!(count(&conn), 1);

        {
            let mut tx = conn.transaction().unwrap();
            tx.set_drop_behavior(DropBehavior::Rollback);
            tx.connection().execute("INSERT INTO t VALUES (2)").unwrap();
        }
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_panic_rolls_back_even_with_commit_drop_behavior() {
        let conn = open_with_table();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let tx = conn.transaction().unwrap();
            assert_eq!(tx.drop_behavior(), DropBehavior::Commit);
            tx.connection().execute("INSERT INTO t VALUES (1)").unwrap();
            panic!("body failed");
        }));
        assert!(outcome.is_err());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_begin_failure_yields_no_transaction() {
        let conn = open_with_table();
        let _outer = conn.transaction().unwrap();
        let nested = conn.transaction();
        match nested {
            Err(LitecallError::Statement { message, .. }) => {
                assert!(message.contains("within a transaction"));
            }
            other => panic!("Expected Statement error, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_commit_stays_active() {
        let conn = open_with_table();
        let mut tx = conn.transaction().unwrap();
        // End the engine-side transaction behind the guard's back.
        conn.execute("ROLLBACK").unwrap();
        assert!(matches!(tx.commit(), Err(LitecallError::Statement { .. })));
        assert_eq!(tx.state(), TransactionState::Active);
    }
}
