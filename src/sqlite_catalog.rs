//! Shadow catalog in the `search_documents` table.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use shadowdex_core::catalog::ShadowCatalog;
use shadowdex_core::{CompositeKey, Document, DocumentDescriptor};

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Row counts per doctype and item type.
    pub async fn counts(&self) -> Result<Vec<(String, String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_type, item_type, COUNT(*) AS n
            FROM search_documents
            GROUP BY doc_type, item_type
            ORDER BY doc_type, item_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("doc_type"), r.get("item_type"), r.get("n")))
            .collect())
    }
}

fn descriptor_from_row(row: &SqliteRow) -> DocumentDescriptor {
    DocumentDescriptor {
        shadow_id: row.get("id"),
        doc_type: row.get("doc_type"),
        doc_id: row.get("doc_id"),
        item_type: row.get("item_type"),
        title: row.get("title"),
        url: row.get("url"),
        updated_at: row.get("updated_at"),
        doc_date: row.get("doc_date"),
        course_id: row.get("course_id"),
        group_id: row.get("group_id"),
    }
}

#[async_trait]
impl ShadowCatalog for SqliteCatalog {
    async fn insert(&self, doc: &Document, updated_at: i64) -> Result<DocumentDescriptor> {
        let desc = DocumentDescriptor::from_document(0, doc, updated_at);
        let id = sqlx::query(
            r#"
            INSERT INTO search_documents (doc_type, doc_id, item_type, title, url, updated_at,
                doc_date, course_id, group_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&desc.doc_type)
        .bind(&desc.doc_id)
        .bind(&desc.item_type)
        .bind(&desc.title)
        .bind(&desc.url)
        .bind(desc.updated_at)
        .bind(desc.doc_date)
        .bind(desc.course_id)
        .bind(desc.group_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(DocumentDescriptor {
            shadow_id: id,
            ..desc
        })
    }

    async fn delete_by_key(&self, key: &CompositeKey) -> Result<usize> {
        let removed = sqlx::query(
            "DELETE FROM search_documents WHERE doc_type = ? AND item_type = ? AND doc_id = ?",
        )
        .bind(&key.doc_type)
        .bind(&key.item_type)
        .bind(&key.doc_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(removed as usize)
    }

    async fn existing_ids(&self, doc_type: &str, item_type: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT doc_id FROM search_documents WHERE doc_type = ? AND item_type = ?",
        )
        .bind(doc_type)
        .bind(item_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn find_by_key(&self, key: &CompositeKey) -> Result<Vec<DocumentDescriptor>> {
        let rows = sqlx::query(
            "SELECT * FROM search_documents WHERE doc_type = ? AND item_type = ? AND doc_id = ? ORDER BY id",
        )
        .bind(&key.doc_type)
        .bind(&key.item_type)
        .bind(&key.doc_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(descriptor_from_row).collect())
    }

    async fn truncate(&self) -> Result<()> {
        sqlx::query("DELETE FROM search_documents")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<DocumentDescriptor>> {
        let rows = sqlx::query("SELECT * FROM search_documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(descriptor_from_row).collect())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
