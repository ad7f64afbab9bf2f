//! SQLite FTS5 full-text engine.
//!
//! Stored fields live in `index_entries`; the indexed text (title, author,
//! contents) lives in the `index_fts` virtual table under the same rowid.
//! Contents are indexed but never stored outside FTS, so hits cannot
//! return them.
//!
//! Adds are buffered in memory and written in one transaction on
//! [`commit`](FullTextEngine::commit). Deletes go straight to disk.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::{Mutex, MutexGuard};

use shadowdex_core::index::{EngineHit, FullTextEngine, IndexedKey};
use shadowdex_core::query::{Field, ParsedQuery, Term};
use shadowdex_core::{CompositeKey, Document};

pub struct SqliteFtsEngine {
    pool: SqlitePool,
    pending: Mutex<Vec<Document>>,
}

impl SqliteFtsEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn pending(&self) -> Result<MutexGuard<'_, Vec<Document>>> {
        self.pending
            .lock()
            .map_err(|_| anyhow!("pending index buffer is poisoned"))
    }

    async fn write(&self, docs: &[Document]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            let extra_json = serde_json::to_string(&doc.extra)?;
            let id = sqlx::query(
                r#"
                INSERT INTO index_entries (doc_id, doc_type, item_type, shadow_id, context_id,
                    course_id, group_id, user_id, title, author, url, doc_date, path, payload, extra_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.doc_id)
            .bind(&doc.doc_type)
            .bind(&doc.item_type)
            .bind(doc.shadow_id)
            .bind(doc.context_id)
            .bind(doc.course_id)
            .bind(doc.group_id)
            .bind(doc.user_id)
            .bind(&doc.title)
            .bind(&doc.author)
            .bind(&doc.url)
            .bind(doc.date)
            .bind(&doc.path)
            .bind(&doc.payload)
            .bind(&extra_json)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            sqlx::query("INSERT INTO index_fts (rowid, title, author, contents) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(&doc.title)
                .bind(&doc.author)
                .bind(&doc.contents)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl FullTextEngine for SqliteFtsEngine {
    async fn is_available(&self) -> bool {
        let tables: Result<i64, sqlx::Error> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('index_entries', 'index_fts')",
        )
        .fetch_one(&self.pool)
        .await;
        matches!(tables, Ok(2))
    }

    async fn add(&self, doc: &Document) -> Result<()> {
        self.pending()?.push(doc.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let docs = std::mem::take(&mut *self.pending()?);
        if docs.is_empty() {
            return Ok(());
        }
        match self.write(&docs).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Keep the batch queued; a later delete_by_key can still drop it.
                let mut pending = self.pending()?;
                let newer = std::mem::replace(&mut *pending, docs);
                pending.extend(newer);
                Err(e)
            }
        }
    }

    async fn delete_by_key(&self, key: &CompositeKey) -> Result<usize> {
        self.pending()?.retain(|d| &d.key() != key);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM index_fts WHERE rowid IN (
                SELECT id FROM index_entries WHERE doc_id = ? AND doc_type = ? AND item_type = ?
            )
            "#,
        )
        .bind(&key.doc_id)
        .bind(&key.doc_type)
        .bind(&key.item_type)
        .execute(&mut *tx)
        .await?;
        let removed = sqlx::query(
            "DELETE FROM index_entries WHERE doc_id = ? AND doc_type = ? AND item_type = ?",
        )
        .bind(&key.doc_id)
        .bind(&key.doc_type)
        .bind(&key.item_type)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        Ok(removed as usize)
    }

    async fn clear(&self) -> Result<()> {
        self.pending()?.clear();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_entries").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, query: &ParsedQuery, limit: usize) -> Result<Vec<EngineHit>> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut sql = String::from(
            r#"
            SELECT e.*, bm25(index_fts, 2.0, 1.0, 1.0) AS relevance
            FROM index_fts
            JOIN index_entries e ON e.id = index_fts.rowid
            WHERE index_fts MATCH ?
            "#,
        );
        if query.doc_type.is_some() {
            sql.push_str(" AND e.doc_type = ?");
        }
        sql.push_str(" ORDER BY relevance, e.id LIMIT ?");

        let mut q = sqlx::query(&sql).bind(expr);
        if let Some(dt) = &query.doc_type {
            q = q.bind(dt);
        }
        let rows = q.bind(limit as i64).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(hit_from_row).collect())
    }

    async fn entries(&self) -> Result<Vec<IndexedKey>> {
        let rows = sqlx::query("SELECT doc_id, doc_type, item_type, shadow_id FROM index_entries")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| IndexedKey {
                key: CompositeKey::new(
                    r.get::<String, _>("doc_id"),
                    r.get::<String, _>("doc_type"),
                    r.get::<String, _>("item_type"),
                ),
                shadow_id: r.get("shadow_id"),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

fn hit_from_row(row: &SqliteRow) -> EngineHit {
    let extra_json: String = row.get("extra_json");
    let relevance: f64 = row.get("relevance");
    EngineHit {
        doc_id: row.get("doc_id"),
        doc_type: row.get("doc_type"),
        item_type: row.get("item_type"),
        shadow_id: row.get("shadow_id"),
        context_id: row.get("context_id"),
        course_id: row.get("course_id"),
        group_id: row.get("group_id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        author: row.get("author"),
        url: row.get("url"),
        date: row.get("doc_date"),
        path: row.get("path"),
        extra: serde_json::from_str(&extra_json).unwrap_or_default(),
        // bm25 is lower-is-better
        score: -relevance,
    }
}

/// Render a parsed query as an FTS5 MATCH expression.
///
/// Required terms are AND'ed; optional terms only constrain matching when
/// there are no required ones. Alongside required terms they sit in an
/// always-true OR group, so bm25 still ranks by them. Every term is quoted
/// so user text never reaches the FTS5 query syntax.
pub fn match_expression(query: &ParsedQuery) -> Option<String> {
    let positive = match (
        join(&query.required, " AND "),
        join(&query.optional, " OR "),
    ) {
        (None, optional) => optional,
        (Some(required), None) => Some(required),
        (Some(required), Some(optional)) => Some(format!(
            "{} AND ({} OR {})",
            required,
            join(&query.required, " OR ").unwrap_or_default(),
            optional
        )),
    }?;

    match join(&query.excluded, " OR ") {
        Some(excluded) => Some(format!("({}) NOT ({})", positive, excluded)),
        None => Some(positive),
    }
}

fn join(terms: &[Term], op: &str) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    Some(terms.iter().map(render_term).collect::<Vec<_>>().join(op))
}

fn render_term(term: &Term) -> String {
    let quoted = format!("\"{}\"", term.text.replace('"', "\"\""));
    let body = if term.prefix {
        format!("{} *", quoted)
    } else {
        quoted
    };
    match term.field {
        Field::Any => body,
        Field::Title => format!("title : {}", body),
        Field::Author => format!("author : {}", body),
    }
}
