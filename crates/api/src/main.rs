use std::sync::Arc;

use anyhow::Context;

use stockroom_api::app::SharedStore;
use stockroom_infra::{InMemoryRecordStore, PostgresRecordStore, StockroomConfig, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    stockroom_observability::init();

    let config = StockroomConfig::from_env().context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let store: SharedStore = match &config.store {
        StoreBackend::InMemory => {
            tracing::warn!("DATABASE_URL not set; records are kept in memory only");
            Arc::new(InMemoryRecordStore::new())
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresRecordStore::connect(database_url, *max_connections)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            Arc::new(store)
        }
    };

    let app = stockroom_api::app::build_app(config.jwt_secret.clone(), store, config.retry);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
