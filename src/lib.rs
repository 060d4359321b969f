// Core infrastructure modules
pub mod core;

// Ambient modules
pub mod config;
pub mod logging;

pub use crate::core::db::{
    Connection, DropBehavior, ResultSet, Row, Transaction, TransactionBehavior, TransactionState,
};
pub use crate::core::{LitecallError, Result};
