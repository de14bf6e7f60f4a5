//! Connection and pool capabilities, and deciding who owns a scope's connection.

use async_trait::async_trait;

use crate::error::{TxError, TxResult};
use crate::proxy::GuardedConnection;

/// A single physical database connection.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Run one statement verbatim and return the number of rows it touched.
    async fn execute(&mut self, sql: &str) -> TxResult<u64>;

    /// Identifier of the transaction currently open on this connection.
    ///
    /// Outside an explicit transaction every call reports a fresh id.
    async fn transaction_id(&mut self) -> TxResult<i64>;

    /// Give the connection back to its pool, or close it when `destroy` is set.
    async fn release_to_pool(self, destroy: bool);
}

/// Something that hands out connections.
#[cfg_attr(test, mockall::automock(type Connection = crate::test_support::FakeConnection;))]
#[async_trait]
pub trait Pool: Send + Sync {
    type Connection: Connection;

    async fn acquire(&self) -> TxResult<Self::Connection>;
}

/// Whether a scope took its connection from a pool or was handed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The caller supplied an open connection and stays responsible for it.
    Borrowed,
    /// The scope acquired the connection and must release it exactly once.
    Acquired,
}

/// The connection a scope works on, and who is responsible for releasing it.
pub struct ClientDetails<C> {
    pub connection: GuardedConnection<C>,
    pub ownership: Ownership,
}

/// Anything a transaction scope can be opened on: a pool or an open connection.
#[async_trait]
pub trait TxSource: Send + Sync {
    type Connection: Connection;

    async fn checkout(&self) -> TxResult<ClientDetails<Self::Connection>>;
}

#[async_trait]
impl<P: Pool> TxSource for P {
    type Connection = P::Connection;

    async fn checkout(&self) -> TxResult<ClientDetails<P::Connection>> {
        let connection = self.acquire().await.map_err(TxError::acquire)?;
        Ok(ClientDetails {
            connection: GuardedConnection::new(connection),
            ownership: Ownership::Acquired,
        })
    }
}

#[async_trait]
impl<C: Connection> TxSource for GuardedConnection<C> {
    type Connection = C;

    async fn checkout(&self) -> TxResult<ClientDetails<C>> {
        Ok(ClientDetails {
            connection: self.clone(),
            ownership: Ownership::Borrowed,
        })
    }
}

/// Resolve `source` into a connection plus ownership. Pool failures propagate unchanged.
pub async fn acquire_client<S>(source: &S) -> TxResult<ClientDetails<S::Connection>>
where
    S: TxSource + ?Sized,
{
    source.checkout().await
}

/// Release the connection if the scope acquired it; borrowed connections are left alone.
pub async fn release_client<C: Connection>(details: ClientDetails<C>, destroy: bool) {
    let ClientDetails {
        connection,
        ownership,
    } = details;
    if ownership == Ownership::Borrowed {
        return;
    }

    tracing::debug!(destroy, "releasing scope connection");
    if let Err(err) = connection.release_with(destroy).await {
        tracing::warn!(error = %err, "scope connection was already released");
    }
}
