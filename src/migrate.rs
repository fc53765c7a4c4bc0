use anyhow::Result;
use sqlx::PgPool;

/// Create the bookkeeping table. Safe to run on every startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_files (
            id BIGSERIAL PRIMARY KEY,
            file_path TEXT NOT NULL,
            source_hash TEXT NOT NULL,
            collection TEXT NOT NULL,
            points_count INTEGER NOT NULL,
            processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The upsert in `store::PgProcessedStore` relies on this constraint.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS processed_files_unique_hash ON processed_files (source_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_processed_files_processed_at ON processed_files (processed_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
