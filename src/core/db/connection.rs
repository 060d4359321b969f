/// Connection Management Module
///
/// A `Connection` owns at most one native handle. It is created closed,
/// becomes open only through `open`, and `close` (also run on drop) releases
/// the handle exactly once.
use crate::config::Config;
use crate::core::db::native::{NativeLibrary, RawHandle};
use crate::core::db::query::{ResultSet, RowCollector};
use crate::core::db::transaction::{DropBehavior, Transaction, TransactionBehavior};
use crate::core::{LitecallError, Result};
use tracing::{debug, warn};

/// Connection to one database file.
///
/// The raw handle keeps this type `!Send` and `!Sync`: a handle is used from
/// a single thread, matching the engine's default threading mode.
#[derive(Debug, Default)]
pub struct Connection {
    /// Native handle plus the library that produced it (None while closed)
    native: Option<(RawHandle, &'static NativeLibrary)>,
    /// Database file, set by `open` or `set_filename`
    filename: Option<String>,
    /// Behavior used by `transaction()`
    default_behavior: TransactionBehavior,
    /// Resolution of transactions dropped while still active
    drop_behavior: DropBehavior,
}

impl Connection {
    /// Creates a closed connection with no filename.
    pub fn new() -> Self {
        Connection::default()
    }

    /// Creates a closed connection that `open_current` will open at `path`.
    pub fn with_filename(path: impl Into<String>) -> Self {
        Connection {
            native: None,
            filename: Some(path.into()),
            default_behavior: TransactionBehavior::default(),
            drop_behavior: DropBehavior::default(),
        }
    }

    /// Builds a connection from configuration, opening it if a database path
    /// is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut conn = Connection::new();
        conn.default_behavior = config.transaction_behavior();
        conn.drop_behavior = config.drop_behavior();
        if let Some(path) = config.database_path() {
            conn.open(path)?;
        }
        Ok(conn)
    }

    /// Opens or creates the database file at `path`.
    ///
    /// # Errors
    ///
    /// - `AlreadyOpen` if this connection already holds a handle.
    /// - `InvalidArgument` if `path` is empty or contains a NUL byte; no
    ///   native call is made.
    /// - `Connection` wrapping the native failure otherwise.
    pub fn open(&mut self, path: impl AsRef<str>) -> Result<()> {
        let path = path.as_ref();
        if self.is_open() {
            return Err(LitecallError::AlreadyOpen);
        }
        if path.is_empty() {
            return Err(LitecallError::InvalidArgument(
                "database path is empty".to_string(),
            ));
        }
        if path.contains('\0') {
            return Err(LitecallError::InvalidArgument(
                "database path contains a NUL byte".to_string(),
            ));
        }

        let native = NativeLibrary::ensure_loaded()
            .and_then(|library| library.open(path).map(|handle| (handle, library)))
            .map_err(|source| LitecallError::Connection {
                path: path.to_string(),
                source: Box::new(source),
            })?;

        self.native = Some(native);
        self.filename = Some(path.to_string());
        debug!(path, "connection opened");
        Ok(())
    }

    /// Opens the filename stored on this connection.
    pub fn open_current(&mut self) -> Result<()> {
        let path = self.filename.clone().unwrap_or_default();
        self.open(path)
    }

    /// Points the connection at another database file and opens it.
    ///
    /// # Errors
    ///
    /// `NotImplemented` while the connection is open; switching the active
    /// database of a live handle is not supported.
    pub fn change_database(&mut self, path: impl AsRef<str>) -> Result<()> {
        if self.is_open() {
            return Err(LitecallError::NotImplemented(
                "switching the active database on an open connection".to_string(),
            ));
        }
        self.open(path)
    }

    /// Releases the native handle. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some((handle, library)) = self.native.take() {
            library.close(handle);
            debug!(path = self.filename.as_deref(), "connection closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.native.is_some()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Changes the stored filename.
    ///
    /// # Errors
    ///
    /// `State` while the connection is open.
    pub fn set_filename(&mut self, filename: Option<String>) -> Result<()> {
        if self.is_open() {
            return Err(LitecallError::State(
                "can't change the file name while the connection is open".to_string(),
            ));
        }
        self.filename = filename;
        Ok(())
    }

    pub fn default_behavior(&self) -> TransactionBehavior {
        self.default_behavior
    }

    pub fn set_default_behavior(&mut self, behavior: TransactionBehavior) {
        self.default_behavior = behavior;
    }

    pub fn drop_behavior(&self) -> DropBehavior {
        self.drop_behavior
    }

    /// Sets how transactions begun on this connection resolve when dropped
    /// while still active.
    pub fn set_drop_behavior(&mut self, drop_behavior: DropBehavior) {
        self.drop_behavior = drop_behavior;
    }

    /// Handle and library for dispatching `sql`.
    fn dispatch_target(&self, sql: &str) -> Result<(RawHandle, &'static NativeLibrary)> {
        let native = self
            .native
            .ok_or_else(|| LitecallError::State("connection is not open".to_string()))?;
        if sql.contains('\0') {
            return Err(LitecallError::InvalidArgument(
                "SQL contains a NUL byte".to_string(),
            ));
        }
        Ok(native)
    }

    /// Runs one or more `;`-separated statements, discarding any rows.
    ///
    /// # Errors
    ///
    /// - `State` if the connection is closed.
    /// - `Statement` carrying the engine's message on failure.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let (handle, library) = self.dispatch_target(sql)?;
        debug!(sql, "execute");
        library.exec(handle, sql, None).map_err(|failure| {
            debug!(code = failure.code, message = %failure.message, "statement failed");
            LitecallError::Statement {
                code: failure.code,
                message: failure.message,
            }
        })
    }

    /// Runs `sql` and returns every row it produced, in engine order.
    pub fn query(&self, sql: &str) -> Result<ResultSet> {
        let mut rows = ResultSet::new();
        self.query_into(sql, &mut rows)?;
        Ok(rows)
    }

    /// Runs `sql`, collecting rows into `rows`.
    ///
    /// `rows` is cleared before dispatch. If the statement fails partway, the
    /// rows the engine already delivered stay in `rows`.
    pub fn query_into(&self, sql: &str, rows: &mut ResultSet) -> Result<()> {
        rows.clear();
        let (handle, library) = self.dispatch_target(sql)?;
        debug!(sql, "query");

        let mut collector = RowCollector::new(rows);
        let outcome = library.exec(handle, sql, Some(&mut collector));
        let collector_failure = collector.failure().map(str::to_string);

        outcome.map_err(|failure| {
            debug!(code = failure.code, message = %failure.message, "query failed");
            LitecallError::Statement {
                code: failure.code,
                message: collector_failure.unwrap_or(failure.message),
            }
        })
    }

    /// Begins a transaction with the connection's default behavior.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        self.begin_transaction(self.default_behavior)
    }

    /// Issues `BEGIN <behavior> TRANSACTION` and returns the live transaction.
    pub fn begin_transaction(&self, behavior: TransactionBehavior) -> Result<Transaction<'_>> {
        Transaction::begin(self, behavior)
    }

    /// Runs `body` inside a transaction: commits if it returns `Ok`, rolls
    /// back if it returns `Err`.
    ///
    /// A failed commit is rolled back and the commit error returned. A failed
    /// rollback is logged and the body's own error is returned.
    pub fn with_transaction<T, E, F>(
        &self,
        behavior: TransactionBehavior,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
        E: From<LitecallError>,
    {
        let mut tx = self.begin_transaction(behavior)?;
        // Only an explicit commit below may make the work durable.
        tx.set_drop_behavior(DropBehavior::Rollback);
        match body(&mut tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(error = %rollback_err, "rollback after failed commit failed");
                    }
                    Err(commit_err.into())
                }
            },
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback after failed transaction body failed");
                }
                Err(err)
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
