//! Error types for transaction scopes.

use thiserror::Error;

/// Result type for transaction scope operations.
pub type TxResult<T> = Result<T, TxError>;

/// Errors that can occur while opening, running or closing a transaction scope.
#[derive(Error, Debug)]
pub enum TxError {
    /// The connection handle was used after its scope ended or after it was
    /// released. Always a programming error; never retried.
    #[error("connection already released")]
    Released,

    /// Statement failed on the database.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The pool could not hand out a connection.
    #[error("failed to acquire connection: {0}")]
    Acquire(#[source] Box<TxError>),

    /// `BEGIN`, the transaction id probe or `SAVEPOINT` failed.
    #[error("failed to open transaction scope: {0}")]
    Begin(#[source] Box<TxError>),

    /// `COMMIT` or `RELEASE SAVEPOINT` failed.
    #[error("failed to commit transaction scope: {0}")]
    Commit(#[source] Box<TxError>),

    /// `ROLLBACK`, `ROLLBACK TO SAVEPOINT` or the trailing `RELEASE SAVEPOINT` failed.
    #[error("failed to roll back transaction scope: {0}")]
    Rollback(#[source] Box<TxError>),
}

impl TxError {
    pub(crate) fn acquire(err: TxError) -> Self {
        TxError::Acquire(Box::new(err))
    }

    pub(crate) fn begin(err: TxError) -> Self {
        TxError::Begin(Box::new(err))
    }

    pub(crate) fn commit(err: TxError) -> Self {
        TxError::Commit(Box::new(err))
    }

    pub(crate) fn rollback(err: TxError) -> Self {
        TxError::Rollback(Box::new(err))
    }

    /// Whether this error, or the error it wraps, is a use-after-release.
    pub fn is_released(&self) -> bool {
        match self {
            TxError::Released => true,
            TxError::Database(_) => false,
            TxError::Acquire(inner)
            | TxError::Begin(inner)
            | TxError::Commit(inner)
            | TxError::Rollback(inner) => inner.is_released(),
        }
    }

    /// The database error at the bottom of the chain, if there is one.
    pub fn as_database_error(&self) -> Option<&sqlx::Error> {
        match self {
            TxError::Released => None,
            TxError::Database(err) => Some(err),
            TxError::Acquire(inner)
            | TxError::Begin(inner)
            | TxError::Commit(inner)
            | TxError::Rollback(inner) => inner.as_database_error(),
        }
    }
}
