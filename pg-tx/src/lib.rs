//! Transaction scopes for pooled PostgreSQL connections.
//!
//! [`tx`] runs a unit of work inside a transaction, or inside a savepoint when
//! the connection it is given is already in one, and always ends it with a
//! commit or a rollback. The connection handle the work receives is refused
//! once the scope has ended, so work that outlives its scope fails loudly
//! instead of running across the transaction boundary.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod proxy;
pub mod scope;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use client::{ClientDetails, Connection, Ownership, Pool, TxSource};
pub use error::{TxError, TxResult};
pub use proxy::GuardedConnection;
pub use scope::{tx, tx_with, TxOptions};
pub use transaction::TransactionMode;
