//! Shadow catalog abstraction.
//!
//! The shadow catalog is the durable record of what is currently in the
//! full-text engine: one [`DocumentDescriptor`] per indexed document. The
//! differential phases compute their work from it, and its `shadow_id`
//! links an engine entry back to a precise deletable row.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CompositeKey, Document, DocumentDescriptor};

/// Abstract shadow catalog backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](ShadowCatalog::insert) | Record a document, assigning its shadow id |
/// | [`delete_by_key`](ShadowCatalog::delete_by_key) | Drop rows for a composite key |
/// | [`existing_ids`](ShadowCatalog::existing_ids) | Doc ids recorded for a doctype/item type |
/// | [`find_by_key`](ShadowCatalog::find_by_key) | Rows for a composite key |
/// | [`truncate`](ShadowCatalog::truncate) | Drop everything (full rebuild) |
#[async_trait]
pub trait ShadowCatalog: Send + Sync {
    async fn insert(&self, doc: &Document, updated_at: i64) -> Result<DocumentDescriptor>;

    /// Returns the number of rows removed; `0` is not an error.
    async fn delete_by_key(&self, key: &CompositeKey) -> Result<usize>;

    async fn existing_ids(&self, doc_type: &str, item_type: &str) -> Result<Vec<String>>;

    async fn find_by_key(&self, key: &CompositeKey) -> Result<Vec<DocumentDescriptor>>;

    async fn truncate(&self) -> Result<()>;

    async fn all(&self) -> Result<Vec<DocumentDescriptor>>;

    async fn count(&self) -> Result<usize>;
}
