//! Opening and closing a scope: a real transaction, or a savepoint when the
//! connection is already inside one.

use crate::client::{ClientDetails, Connection, Ownership};
use crate::error::{TxError, TxResult};
use crate::proxy::GuardedConnection;

/// Probe for the id of the transaction open on the connection.
pub const TRANSACTION_ID_QUERY: &str = "SELECT txid_current()";

/// Savepoint used to emulate a nested scope. Nesting depth lives in the call
/// stack, so one name is enough.
pub const SAVEPOINT_NAME: &str = "pg_tx";

const BEGIN: &str = "BEGIN";
const COMMIT: &str = "COMMIT";
const ROLLBACK: &str = "ROLLBACK";
const SAVEPOINT: &str = "SAVEPOINT pg_tx";
const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT pg_tx";
const RELEASE_SAVEPOINT: &str = "RELEASE SAVEPOINT pg_tx";

/// How a scope was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// `BEGIN` started a new transaction.
    Transaction,
    /// A transaction was already open; the scope is a savepoint inside it.
    Savepoint,
}

/// The connection a scope runs on, paired with how the scope was opened.
pub struct TransactionDetails<'a, C> {
    pub connection: &'a GuardedConnection<C>,
    pub mode: TransactionMode,
}

/// Open a scope on the client's connection.
///
/// An acquired connection is private to the scope, so `BEGIN` always starts a
/// new transaction. A borrowed connection may already be inside one, and
/// PostgreSQL answers a redundant `BEGIN` with a warning rather than an error.
/// The transaction id before and after `BEGIN` tells the two cases apart.
pub async fn begin_transaction<C: Connection>(
    details: &ClientDetails<C>,
) -> TxResult<TransactionMode> {
    let connection = &details.connection;
    let mode = match details.ownership {
        Ownership::Acquired => {
            connection.execute(BEGIN).await.map_err(TxError::begin)?;
            TransactionMode::Transaction
        }
        Ownership::Borrowed => {
            let pre_begin = connection
                .transaction_id()
                .await
                .map_err(TxError::begin)?;
            connection.execute(BEGIN).await.map_err(TxError::begin)?;
            let post_begin = connection
                .transaction_id()
                .await
                .map_err(TxError::begin)?;

            if pre_begin != post_begin {
                TransactionMode::Transaction
            } else {
                connection.execute(SAVEPOINT).await.map_err(TxError::begin)?;
                TransactionMode::Savepoint
            }
        }
    };

    tracing::debug!(ownership = ?details.ownership, ?mode, "transaction scope opened");
    Ok(mode)
}

/// Make the scope's work permanent.
pub async fn commit_transaction<C: Connection>(details: TransactionDetails<'_, C>) -> TxResult<()> {
    let statement = match details.mode {
        TransactionMode::Transaction => COMMIT,
        TransactionMode::Savepoint => RELEASE_SAVEPOINT,
    };
    details
        .connection
        .execute(statement)
        .await
        .map_err(TxError::commit)?;

    tracing::debug!(mode = ?details.mode, "transaction scope committed");
    Ok(())
}

/// Undo the scope's work. A savepoint is released after rolling back to it so
/// it does not linger until the enclosing transaction ends.
pub async fn cancel_transaction<C: Connection>(details: TransactionDetails<'_, C>) -> TxResult<()> {
    let connection = details.connection;
    match details.mode {
        TransactionMode::Transaction => {
            connection.execute(ROLLBACK).await.map_err(TxError::rollback)?;
        }
        TransactionMode::Savepoint => {
            connection
                .execute(ROLLBACK_TO_SAVEPOINT)
                .await
                .map_err(TxError::rollback)?;
            connection
                .execute(RELEASE_SAVEPOINT)
                .await
                .map_err(TxError::rollback)?;
        }
    }

    tracing::debug!(mode = ?details.mode, "transaction scope rolled back");
    Ok(())
}

/// Check that the engine reports transaction ids the way savepoint emulation
/// relies on: a new id once `BEGIN` starts a transaction, and a stable id
/// inside it. Leaves no transaction open.
pub async fn check_engine_support<C: Connection>(
    connection: &GuardedConnection<C>,
) -> TxResult<bool> {
    let outside = connection.transaction_id().await?;
    connection.execute(BEGIN).await?;

    let probed = async {
        let first = connection.transaction_id().await?;
        let second = connection.transaction_id().await?;
        Ok::<_, TxError>((first, second))
    }
    .await;
    connection.execute(ROLLBACK).await?;

    let (first, second) = probed?;
    let supported = outside != first && first == second;
    tracing::debug!(outside, first, second, supported, "checked transaction id probe");
    Ok(supported)
}
