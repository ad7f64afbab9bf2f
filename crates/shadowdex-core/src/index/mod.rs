//! Full-text engine abstraction.
//!
//! The [`FullTextEngine`] trait is the only way the sync and query engines
//! touch the physical index, so backends are pluggable (SQLite FTS5 in the
//! `shadowdex` crate, [`memory::InMemoryEngine`] for tests).
//!
//! # Write semantics
//!
//! | Method | When it takes effect |
//! |--------|----------------------|
//! | [`add`](FullTextEngine::add) | on the next [`commit`](FullTextEngine::commit) |
//! | [`delete_by_key`](FullTextEngine::delete_by_key) | immediately, also drops uncommitted adds |
//! | [`clear`](FullTextEngine::clear) | immediately |
//!
//! Deletions being immediate is what lets the sync engine delete from the
//! engine before it deletes the catalog row, even if the run dies before
//! its next commit.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{CompositeKey, Document};
use crate::query::ParsedQuery;

/// One ranked hit: the stored document fields (never `contents`) plus score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineHit {
    pub doc_id: String,
    pub doc_type: String,
    pub item_type: String,
    pub shadow_id: Option<i64>,
    pub context_id: i64,
    pub course_id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub title: String,
    pub author: String,
    pub url: String,
    pub date: i64,
    pub path: String,
    pub extra: BTreeMap<String, String>,
    /// Higher is better. Only meaningful relative to the same result list.
    pub score: f64,
}

impl EngineHit {
    /// Project a document into a hit, dropping its contents.
    pub fn from_document(doc: &Document, score: f64) -> Self {
        Self {
            doc_id: doc.doc_id.clone(),
            doc_type: doc.doc_type.clone(),
            item_type: doc.item_type.clone(),
            shadow_id: doc.shadow_id,
            context_id: doc.context_id,
            course_id: doc.course_id,
            group_id: doc.group_id,
            user_id: doc.user_id,
            title: doc.title.clone(),
            author: doc.author.clone(),
            url: doc.url.clone(),
            date: doc.date,
            path: doc.path.clone(),
            extra: doc.extra.clone(),
            score,
        }
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.doc_id, &self.doc_type, &self.item_type)
    }
}

/// Identity of a committed engine entry, used by consistency sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedKey {
    pub key: CompositeKey,
    pub shadow_id: Option<i64>,
}

/// Abstract full-text engine.
///
/// Implementations must be `Send + Sync`; the query engine may call
/// [`find`](FullTextEngine::find) concurrently with a sync run writing
/// through another handle.
#[async_trait]
pub trait FullTextEngine: Send + Sync {
    /// Whether the index exists and can be read.
    async fn is_available(&self) -> bool;

    /// Queue a document for the next commit.
    async fn add(&self, doc: &Document) -> Result<()>;

    /// Make all queued adds visible.
    async fn commit(&self) -> Result<()>;

    /// Remove every entry (committed or queued) with this key.
    ///
    /// Returns how many committed entries were removed; `0` is not an error.
    async fn delete_by_key(&self, key: &CompositeKey) -> Result<usize>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;

    /// Run a query, returning at most `limit` hits in relevance order.
    async fn find(&self, query: &ParsedQuery, limit: usize) -> Result<Vec<EngineHit>>;

    /// Keys of all committed entries.
    async fn entries(&self) -> Result<Vec<IndexedKey>>;

    /// Number of committed entries.
    async fn count(&self) -> Result<usize>;
}
