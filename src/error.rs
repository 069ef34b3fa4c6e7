//! Error types for the fixture loader.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The result type used throughout the fixture loader.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for fixture loading operations.
///
/// Errors raised inside a DSL call travel through the Lua VM as external
/// errors and are recovered with their original variant once the script
/// fails, so `Clone` is required (the I/O source is shared behind an `Arc`).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A script resource could not be read.
    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A DSL function was called with the wrong shape of arguments, or
    /// outside of the context it requires.
    #[error("Usage error: {0}")]
    Usage(String),

    /// An entity type could not be default-constructed.
    #[error("Cannot instantiate entity type '{entity_type}': {reason}")]
    Instantiation {
        /// Name of the offending entity type.
        entity_type: String,
        /// Why construction failed.
        reason: String,
    },

    /// The persistence layer rejected an operation.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The script failed to compile or raised an error of its own.
    #[error("Script error: {0}")]
    Script(String),

    /// The requested entity, type or resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A component was used in an invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a new usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Creates a new instantiation error for the given entity type.
    pub fn instantiation(entity_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Instantiation { entity_type: entity_type.into(), reason: reason.into() }
    }

    /// Creates a new persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns true for errors caused by a malformed script rather than by
    /// its environment.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<mlua::Error> for Error {
    fn from(err: mlua::Error) -> Self {
        match loader_error(&err) {
            Some(inner) => inner.clone(),
            None => Error::Script(err.to_string()),
        }
    }
}

impl From<Error> for mlua::Error {
    fn from(err: Error) -> Self {
        mlua::Error::external(err)
    }
}

/// Finds a loader error carried inside a Lua error chain.
fn loader_error(err: &mlua::Error) -> Option<&Error> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<Error>(),
        mlua::Error::CallbackError { cause, .. } => loader_error(cause),
        _ => None,
    }
}
