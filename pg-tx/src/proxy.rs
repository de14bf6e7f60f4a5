//! Guarded connection handles.
//!
//! A [`GuardedConnection`] wraps a physical connection and refuses every
//! operation once its scope has ended. Handles are cheap to clone; clones share
//! the same latch, so a task that kept a clone past the end of its scope gets
//! [`TxError::Released`] instead of running a query on a connection that is
//! being committed, rolled back or returned to the pool.
//!
//! Scope handles created for a `tx` callback share the physical connection of
//! the handle they were opened on and add a latch of their own to the chain. An
//! operation goes through only while every latch in the chain is open.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::client::Connection;
use crate::error::{TxError, TxResult};
use crate::transaction::TransactionMode;

pub struct GuardedConnection<C> {
    slot: Arc<Mutex<Option<C>>>,
    latch: Arc<AtomicBool>,
    parents: Vec<Arc<AtomicBool>>,
    root: bool,
    mode: Option<TransactionMode>,
}

impl<C> Clone for GuardedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            latch: Arc::clone(&self.latch),
            parents: self.parents.clone(),
            root: self.root,
            mode: self.mode,
        }
    }
}

impl<C> fmt::Debug for GuardedConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedConnection")
            .field("released", &self.is_released())
            .field("root", &self.root)
            .field("depth", &self.parents.len())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<C> GuardedConnection<C> {
    /// A handle for a scope opened on this one. It shares the physical
    /// connection and is refused once either scope has ended.
    pub(crate) fn scope(&self, mode: TransactionMode) -> Self {
        let mut parents = self.parents.clone();
        parents.push(Arc::clone(&self.latch));
        Self {
            slot: Arc::clone(&self.slot),
            latch: Arc::new(AtomicBool::new(false)),
            parents,
            root: false,
            mode: Some(mode),
        }
    }

    /// Whether this handle, or any scope it was opened inside, has ended.
    pub fn is_released(&self) -> bool {
        self.latch.load(Ordering::Acquire)
            || self
                .parents
                .iter()
                .any(|latch| latch.load(Ordering::Acquire))
    }

    /// How the scope this handle belongs to was opened. `None` for handles
    /// built directly with [`GuardedConnection::new`].
    pub fn transaction_mode(&self) -> Option<TransactionMode> {
        self.mode
    }

    fn ensure_open(&self) -> TxResult<()> {
        if self.is_released() {
            Err(TxError::Released)
        } else {
            Ok(())
        }
    }

    /// Quote `identifier` for use as a PostgreSQL identifier.
    pub fn quote_identifier(&self, identifier: &str) -> TxResult<String> {
        self.ensure_open()?;
        Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
    }

    /// Quote `literal` for use as a PostgreSQL string constant. Backslashes
    /// switch to the `E'...'` escape string form.
    pub fn quote_literal(&self, literal: &str) -> TxResult<String> {
        self.ensure_open()?;
        let quoted = literal.replace('\'', "''");
        if quoted.contains('\\') {
            Ok(format!("E'{}'", quoted.replace('\\', "\\\\")))
        } else {
            Ok(format!("'{}'", quoted))
        }
    }

    /// End the scope of this handle without touching the physical connection.
    pub(crate) fn end_scope(&self) {
        self.latch.store(true, Ordering::Release);
    }
}

impl<C: Connection> GuardedConnection<C> {
    /// Take ownership of a physical connection. Releasing this handle returns
    /// the connection to its pool.
    pub fn new(connection: C) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(connection))),
            latch: Arc::new(AtomicBool::new(false)),
            parents: Vec::new(),
            root: true,
            mode: None,
        }
    }

    /// Exclusive access to the underlying connection, for driver calls the
    /// handle does not wrap (parameterized queries, `COPY`, ...).
    ///
    /// The latch is checked again once the connection is obtained, so a caller
    /// that was queued behind the scope's last statement is refused as well.
    pub async fn lock(&self) -> TxResult<MappedMutexGuard<'_, C>> {
        self.ensure_open()?;
        let guard = self.slot.lock().await;
        self.ensure_open()?;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| TxError::Released)
    }

    pub async fn execute(&self, sql: &str) -> TxResult<u64> {
        let mut connection = self.lock().await?;
        connection.execute(sql).await
    }

    pub async fn transaction_id(&self) -> TxResult<i64> {
        let mut connection = self.lock().await?;
        connection.transaction_id().await
    }

    /// Release the handle. Any later operation, including a second release,
    /// fails with [`TxError::Released`].
    ///
    /// A handle from [`GuardedConnection::new`] returns its connection to the
    /// pool. A scope handle only ends the scope early; the scope still commits
    /// or rolls back and releases the connection itself.
    pub async fn release(&self) -> TxResult<()> {
        self.ensure_open()?;
        self.release_with(false).await
    }

    pub(crate) async fn release_with(&self, destroy: bool) -> TxResult<()> {
        if self.latch.swap(true, Ordering::AcqRel) {
            return Err(TxError::Released);
        }
        if !self.root {
            return Ok(());
        }

        let connection = self.slot.lock().await.take();
        match connection {
            Some(connection) => {
                connection.release_to_pool(destroy).await;
                Ok(())
            }
            None => Err(TxError::Released),
        }
    }

    #[cfg(test)]
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.slot)
    }
}
