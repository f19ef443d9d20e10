//! Embedded schema migrations for the PostgreSQL backend.

use sqlx::PgPool;

use relaymon_store::StoreError;

/// Idempotent schema setup, run at connect time.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS observations (
            provider     TEXT        NOT NULL,
            service      TEXT        NOT NULL,
            channel      TEXT        NOT NULL,
            model        TEXT        NOT NULL,
            timestamp    TIMESTAMPTZ NOT NULL,
            status       SMALLINT    NOT NULL,
            sub_status   TEXT        NOT NULL,
            http_status  INTEGER,
            latency_ms   BIGINT      NOT NULL,
            body_snippet TEXT,
            error        TEXT,
            PRIMARY KEY (provider, service, channel, model, timestamp)
        )",
        "CREATE INDEX IF NOT EXISTS idx_observations_timestamp
            ON observations (timestamp)",
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
    }
    Ok(())
}
