//! Running a unit of work inside a transaction scope.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::client::{acquire_client, release_client, TxSource};
use crate::error::TxError;
use crate::proxy::GuardedConnection;
use crate::transaction::{
    begin_transaction, cancel_transaction, commit_transaction, TransactionDetails,
};

/// Knobs for a single scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
    /// Roll back even when the callback succeeds. Handy for tests that must
    /// leave the database untouched.
    pub force_rollback: bool,
}

impl TxOptions {
    pub fn force_rollback() -> Self {
        Self {
            force_rollback: true,
        }
    }
}

/// Run `callback` inside a transaction on `source` and commit if it succeeds.
///
/// See [`tx_with`].
pub async fn tx<S, F, Fut, T, E>(source: &S, callback: F) -> Result<T, E>
where
    S: TxSource + ?Sized,
    F: FnOnce(GuardedConnection<S::Connection>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TxError> + fmt::Debug,
{
    tx_with(source, TxOptions::default(), callback).await
}

/// Run `callback` inside a transaction scope on `source`.
///
/// A pool source gets a fresh connection and a new transaction; the connection
/// goes back to the pool when the scope is over. A [`GuardedConnection`] source
/// is borrowed: if it is already inside a transaction the scope becomes a
/// savepoint, and the connection is left open for the caller.
///
/// The handle passed to `callback` stops working the moment `callback`
/// finishes, before the scope commits or rolls back. Work the callback
/// started but did not wait for fails with [`TxError::Released`] instead of
/// running across the transaction boundary.
///
/// An error from `callback` rolls the scope back and is returned as is, unless
/// the rollback fails too, in which case the rollback error is returned. A
/// panic rolls back as well and then resumes. A failed commit is followed by a
/// rollback attempt before the commit error is returned.
pub async fn tx_with<S, F, Fut, T, E>(source: &S, options: TxOptions, callback: F) -> Result<T, E>
where
    S: TxSource + ?Sized,
    F: FnOnce(GuardedConnection<S::Connection>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TxError> + fmt::Debug,
{
    let span = tracing::debug_span!("pg_tx_scope", force_rollback = options.force_rollback);
    run_scope(source, options, callback).instrument(span).await
}

async fn run_scope<S, F, Fut, T, E>(source: &S, options: TxOptions, callback: F) -> Result<T, E>
where
    S: TxSource + ?Sized,
    F: FnOnce(GuardedConnection<S::Connection>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TxError> + fmt::Debug,
{
    let details = acquire_client(source).await?;

    let mode = match begin_transaction(&details).await {
        Ok(mode) => mode,
        Err(err) => {
            release_client(details, false).await;
            return Err(err.into());
        }
    };

    let scoped = details.connection.scope(mode);
    let handle = scoped.clone();
    let outcome = AssertUnwindSafe(async move { callback(handle).await })
        .catch_unwind()
        .await;
    // Must happen before COMMIT/ROLLBACK is sent.
    scoped.end_scope();

    let transaction = || TransactionDetails {
        connection: &details.connection,
        mode,
    };

    let (result, destroy) = match outcome {
        Ok(Ok(value)) if options.force_rollback => match cancel_transaction(transaction()).await {
            Ok(()) => (Ok(value), false),
            Err(err) => (Err(err.into()), true),
        },
        Ok(Ok(value)) => match commit_transaction(transaction()).await {
            Ok(()) => (Ok(value), false),
            Err(err) => {
                let destroy = match cancel_transaction(transaction()).await {
                    Ok(()) => false,
                    Err(cancel_err) => {
                        tracing::warn!(
                            error = %cancel_err,
                            "rollback after failed commit also failed"
                        );
                        true
                    }
                };
                (Err(err.into()), destroy)
            }
        },
        Ok(Err(err)) => {
            tracing::debug!(error = ?err, "callback failed, rolling back");
            match cancel_transaction(transaction()).await {
                Ok(()) => (Err(err), false),
                Err(cancel_err) => {
                    tracing::warn!(
                        original = ?err,
                        error = %cancel_err,
                        "rollback failed after callback error"
                    );
                    (Err(cancel_err.into()), true)
                }
            }
        }
        Err(panic) => {
            let destroy = match cancel_transaction(transaction()).await {
                Ok(()) => false,
                Err(cancel_err) => {
                    tracing::warn!(error = %cancel_err, "rollback failed after callback panic");
                    true
                }
            };
            release_client(details, destroy).await;
            std::panic::resume_unwind(panic);
        }
    };

    release_client(details, destroy).await;
    result
}
