/// Database Module
///
/// ## Architecture
///
/// The database layer is split into four concerns, leaf first:
/// - **Native Binding** (`native.rs`): the engine's C entry points, resolved once per process
/// - **Rows** (`query.rs`): result types and the per-row trampoline called by the engine
/// - **Connection Management** (`connection.rs`): handle lifecycle, execute and query
/// - **Transactions** (`transaction.rs`): BEGIN/END/ROLLBACK on a borrowed connection
///
/// ## Error Handling
///
/// All database operations use the standardized `LitecallError` type. Native
/// error buffers are copied and released before an error leaves `native.rs`.
pub mod connection;
pub mod native;
pub mod query;
pub mod transaction;

pub use connection::Connection;
pub use native::{library_version, NativeLibrary, WordWidth};
pub use query::{ResultSet, Row};
pub use transaction::{DropBehavior, Transaction, TransactionBehavior, TransactionState};
