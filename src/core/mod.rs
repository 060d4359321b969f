/// Core Module for Litecall
///
/// The connection, statement-execution and transaction layer over the
/// native engine, plus the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{LitecallError, NativeFailure, Result};
