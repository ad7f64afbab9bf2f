use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every index-side table. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // Stored fields of engine entries; rowid is shared with index_fts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            item_type TEXT NOT NULL,
            shadow_id INTEGER,
            context_id INTEGER NOT NULL DEFAULT 0,
            course_id INTEGER NOT NULL DEFAULT 0,
            group_id INTEGER NOT NULL DEFAULT 0,
            user_id INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            doc_date INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL DEFAULT '',
            payload TEXT NOT NULL DEFAULT '',
            extra_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Shadow catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_type TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL,
            doc_date INTEGER NOT NULL DEFAULT 0,
            course_id INTEGER NOT NULL DEFAULT 0,
            group_id INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Watermarks and busy flag, one row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            addition_cursor INTEGER NOT NULL DEFAULT 0,
            update_cursor INTEGER NOT NULL DEFAULT 0,
            busy INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("INSERT OR IGNORE INTO sync_state (id) VALUES (1)")
        .execute(pool)
        .await?;

    // Writer lock, at most one row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_lock (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            acquired_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE index_fts USING fts5(
                title,
                author,
                contents
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_key ON index_entries(doc_id, doc_type, item_type)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_documents_key ON search_documents(doc_type, item_type, doc_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
