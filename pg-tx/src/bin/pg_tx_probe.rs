use pg_tx::{
    config::Config,
    db::connection::{create_pool_with_config, PoolConfig},
    transaction::check_engine_support,
    tx_with, GuardedConnection, Pool, TransactionMode, TxError, TxOptions,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Checks that the configured database supports savepoint emulation and that a
/// nested scope really ends up as a savepoint. Everything is rolled back.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pg_tx=debug,pg_tx_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool_with_config(&config.database_url, PoolConfig::from(&config)).await?;

    let connection = GuardedConnection::new(Pool::acquire(&pool).await?);
    let checked = check_engine_support(&connection).await;
    connection.release().await?;
    if !checked? {
        anyhow::bail!("database does not report transaction ids usable for savepoint detection");
    }
    tracing::info!("transaction id probe supported");

    let modes = tx_with(&pool, TxOptions::force_rollback(), |db| async move {
        let outer = db.transaction_mode();
        let inner = tx_with(&db, TxOptions::force_rollback(), |nested| async move {
            Ok::<_, TxError>(nested.transaction_mode())
        })
        .await?;
        Ok::<_, TxError>((outer, inner))
    })
    .await?;

    if modes != (Some(TransactionMode::Transaction), Some(TransactionMode::Savepoint)) {
        anyhow::bail!("unexpected scope modes: {:?}", modes);
    }
    tracing::info!(?modes, "nested scope used a savepoint");

    Ok(())
}
