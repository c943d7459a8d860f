use crate::config::DatabaseConfig;
use crate::error::ParleyError;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Statements run at startup. Each one is idempotent.
///
/// The `log_delete` trigger archives a session's transcript whenever its row
/// is deleted, so the log stays owned by the database rather than the caller.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        user_id        BIGINT PRIMARY KEY,
        transcript     TEXT NOT NULL DEFAULT '',
        message_count  INTEGER NOT NULL DEFAULT 0,
        last_activity  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS log (
        id                   BIGSERIAL PRIMARY KEY,
        user_id              BIGINT NOT NULL,
        archived_transcript  TEXT NOT NULL,
        archived_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS log_user_id_idx ON log (user_id)",
    r#"
    CREATE OR REPLACE FUNCTION archive_deleted_session() RETURNS trigger AS $$
    BEGIN
        INSERT INTO log (user_id, archived_transcript, archived_at)
        VALUES (OLD.user_id, OLD.transcript, NOW());
        RETURN OLD;
    END;
    $$ LANGUAGE plpgsql
    "#,
    "DROP TRIGGER IF EXISTS log_delete ON sessions",
    r#"
    CREATE TRIGGER log_delete AFTER DELETE ON sessions
    FOR EACH ROW EXECUTE FUNCTION archive_deleted_session()
    "#,
];

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, ParleyError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), ParleyError> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!("Database schema ready");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
