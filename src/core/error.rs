/// Litecall Error Module
///
/// This module defines the error types surfaced by every connection,
/// statement and transaction operation. Native failures are always decoded
/// (message copied out, engine buffer released) before they are wrapped here.
use std::fmt;
use std::os::raw::c_int;
use thiserror::Error;

/// A failure reported by the native engine: its status code and the message
/// text copied out of the engine before the buffer was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFailure {
    pub code: c_int,
    pub message: String,
}

impl NativeFailure {
    pub fn new(code: c_int, message: impl Into<String>) -> Self {
        NativeFailure {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "native status {}", self.code)
        } else {
            write!(f, "native status {}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for NativeFailure {}

/// Error type for every litecall operation.
///
/// The variants distinguish:
/// - caller mistakes (`InvalidArgument`, `AlreadyOpen`, `State`)
/// - native failures (`Connection`, `Statement`, `Native`)
/// - provisioning of the engine itself (`NativeLoad`)
/// - ambient concerns (`Config`, `Io`, `Json`)
#[derive(Error, Debug)]
pub enum LitecallError {
    /// Missing or malformed argument, e.g. an empty database path
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `open` called on a connection that already holds a handle
    #[error("Connection is already open")]
    AlreadyOpen,

    /// Operation not permitted in the connection's current state
    #[error("State error: {0}")]
    State(String),

    /// Opening the database failed; `source` is the underlying cause
    #[error("Could not connect to database '{path}'")]
    Connection {
        path: String,
        #[source]
        source: Box<LitecallError>,
    },

    /// Statement execution failed; `message` is the engine's text verbatim
    #[error("{message}")]
    Statement { code: c_int, message: String },

    /// The native engine could not be resolved for this process
    #[error("Native library error: {0}")]
    NativeLoad(String),

    /// Operation deliberately unsupported
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Raw native failure, used as the cause of a higher level error
    #[error(transparent)]
    Native(#[from] NativeFailure),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LitecallError {
    /// Native status code carried by this error or its cause, if any.
    pub fn native_code(&self) -> Option<c_int> {
        match self {
            LitecallError::Statement { code, .. } => Some(*code),
            LitecallError::Native(failure) => Some(failure.code),
            LitecallError::Connection { source, .. } => source.native_code(),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for LitecallError {
    fn from(err: toml::de::Error) -> Self {
        LitecallError::Config(err.to_string())
    }
}

/// Type alias for Result to use LitecallError as the error type.
pub type Result<T> = std::result::Result<T, LitecallError>;
