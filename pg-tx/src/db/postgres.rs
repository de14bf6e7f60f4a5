//! PostgreSQL connections and pools from sqlx.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use crate::client::{Connection, Pool};
use crate::error::TxResult;
use crate::transaction::TRANSACTION_ID_QUERY;

#[async_trait]
impl Connection for PoolConnection<Postgres> {
    async fn execute(&mut self, sql: &str) -> TxResult<u64> {
        // A plain &str goes over the simple query protocol, unprepared.
        let result = sqlx::Executor::execute(&mut **self, sql).await?;
        Ok(result.rows_affected())
    }

    async fn transaction_id(&mut self) -> TxResult<i64> {
        let txid = sqlx::query_scalar::<_, i64>(TRANSACTION_ID_QUERY)
            .fetch_one(&mut **self)
            .await?;
        Ok(txid)
    }

    async fn release_to_pool(mut self, destroy: bool) {
        if destroy {
            self.close_on_drop();
        }
        drop(self);
    }
}

#[async_trait]
impl Pool for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> TxResult<PoolConnection<Postgres>> {
        let connection = PgPool::acquire(self).await?;
        Ok(connection)
    }
}
