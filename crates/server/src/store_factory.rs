//! Construction of the configured observation store backend.

use std::sync::Arc;

use tracing::info;

use relaymon_config::{ResolvedConfig, StorageBackend};
use relaymon_store::ObservationStore;
use relaymon_store_postgres::{PgStore, PgStoreOptions};
use relaymon_store_sqlite::SqliteStore;

use crate::error::ServerError;

/// Connect the store backend selected by the resolved configuration.
///
/// Fails fast: a storage backend that cannot be reached at startup is a
/// process-level error.
pub async fn create_store(
    config: &ResolvedConfig,
) -> Result<Arc<dyn ObservationStore>, ServerError> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let path = config
                .storage
                .sqlite_path
                .clone()
                .unwrap_or_else(|| "relaymon.db".into());
            let store = SqliteStore::connect(
                &path,
                config.batch_query_max_keys,
                config.enable_batch_query,
            )
            .await?;
            info!(path = %path, "sqlite store initialized");
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => {
            let pg = config
                .storage
                .postgres
                .as_ref()
                .ok_or_else(|| ServerError::Config("postgres settings missing".into()))?;
            let store = PgStore::connect(
                pg,
                PgStoreOptions {
                    batch_max_keys: config.batch_query_max_keys,
                    enable_batch_query: config.enable_batch_query,
                    enable_db_timeline_agg: config.enable_db_timeline_agg,
                },
            )
            .await?;
            info!(host = %pg.host, dbname = %pg.dbname, "postgres store initialized");
            Ok(Arc::new(store))
        }
    }
}
