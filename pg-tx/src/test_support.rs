//! In-memory connection used by the unit tests.
//!
//! It records every statement and mimics how PostgreSQL reports transaction
//! ids: a fresh id per statement outside a transaction, a stable one inside,
//! and a redundant `BEGIN` that changes nothing.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::{Connection, Pool};
use crate::error::{TxError, TxResult};
use crate::transaction::TRANSACTION_ID_QUERY;

#[derive(Debug, Default)]
pub struct FakeState {
    pub statements: Vec<String>,
    pub in_transaction: bool,
    pub txid: i64,
    pub fail_on: Vec<String>,
    pub releases: Vec<bool>,
    pub acquired: usize,
}

pub type SharedState = Arc<Mutex<FakeState>>;

#[derive(Debug)]
pub struct FakeConnection {
    state: SharedState,
}

impl FakeConnection {
    pub fn new() -> (Self, SharedState) {
        let state = SharedState::default();
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }
}

fn failure(sql: &str) -> TxError {
    TxError::Database(sqlx::Error::Protocol(format!("{} failed", sql)))
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&mut self, sql: &str) -> TxResult<u64> {
        let mut state = self.state();
        state.statements.push(sql.to_string());
        if state.fail_on.iter().any(|failing| failing == sql) {
            return Err(failure(sql));
        }
        match sql {
            "BEGIN" if !state.in_transaction => {
                state.in_transaction = true;
                state.txid += 1;
            }
            "COMMIT" | "ROLLBACK" => state.in_transaction = false,
            _ => {}
        }
        Ok(0)
    }

    async fn transaction_id(&mut self) -> TxResult<i64> {
        let mut state = self.state();
        state.statements.push(TRANSACTION_ID_QUERY.to_string());
        if state.fail_on.iter().any(|failing| failing == TRANSACTION_ID_QUERY) {
            return Err(failure(TRANSACTION_ID_QUERY));
        }
        if !state.in_transaction {
            state.txid += 1;
        }
        Ok(state.txid)
    }

    async fn release_to_pool(self, destroy: bool) {
        self.state().releases.push(destroy);
    }
}

/// Hands out connections that all share one recorded state.
#[derive(Debug, Default)]
pub struct FakePool {
    state: SharedState,
}

impl FakePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(statements: &[&str]) -> Self {
        let pool = Self::new();
        pool.state().fail_on = statements.iter().map(|s| s.to_string()).collect();
        pool
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }
}

#[async_trait]
impl Pool for FakePool {
    type Connection = FakeConnection;

    async fn acquire(&self) -> TxResult<FakeConnection> {
        self.state().acquired += 1;
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
        })
    }
}
