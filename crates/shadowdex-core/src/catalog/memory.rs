//! In-memory [`ShadowCatalog`] for tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CompositeKey, Document, DocumentDescriptor};

use super::ShadowCatalog;

pub struct InMemoryCatalog {
    rows: RwLock<Vec<DocumentDescriptor>>,
    next_id: AtomicI64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShadowCatalog for InMemoryCatalog {
    async fn insert(&self, doc: &Document, updated_at: i64) -> Result<DocumentDescriptor> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let desc = DocumentDescriptor::from_document(id, doc, updated_at);
        self.rows.write().unwrap().push(desc.clone());
        Ok(desc)
    }

    async fn delete_by_key(&self, key: &CompositeKey) -> Result<usize> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| &r.key() != key);
        Ok(before - rows.len())
    }

    async fn existing_ids(&self, doc_type: &str, item_type: &str) -> Result<Vec<String>> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.doc_type == doc_type && r.item_type == item_type)
            .map(|r| r.doc_id.clone())
            .collect())
    }

    async fn find_by_key(&self, key: &CompositeKey) -> Result<Vec<DocumentDescriptor>> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|r| &r.key() == key)
            .cloned()
            .collect())
    }

    async fn truncate(&self) -> Result<()> {
        self.rows.write().unwrap().clear();
        Ok(())
    }

    async fn all(&self) -> Result<Vec<DocumentDescriptor>> {
        Ok(self.rows.read().unwrap().clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().unwrap().len())
    }
}
