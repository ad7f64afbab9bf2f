//! In-memory [`FullTextEngine`] for tests.
//!
//! Documents live in a `Vec` behind `std::sync::RwLock`. Matching is plain
//! lowercase word comparison; the score is the number of matching word
//! occurrences with title hits counted twice. Good enough to exercise the
//! sync and query protocols, not meant as a ranking model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{CompositeKey, Document};
use crate::query::{Field, ParsedQuery, Term};

use super::{EngineHit, FullTextEngine, IndexedKey};

/// In-memory engine for tests.
pub struct InMemoryEngine {
    committed: RwLock<Vec<Document>>,
    pending: Mutex<Vec<Document>>,
    available: AtomicBool,
    fail_commits: AtomicBool,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// Simulate a missing or corrupt index.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every subsequent commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of queued, uncommitted adds.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Committed documents with this key.
    pub fn documents_for(&self, key: &CompositeKey) -> Vec<Document> {
        self.committed
            .read()
            .unwrap()
            .iter()
            .filter(|d| &d.key() == key)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn count_in(field_words: &[String], term: &Term) -> usize {
    if term.phrase {
        let phrase = words(&term.text);
        if phrase.is_empty() || phrase.len() > field_words.len() {
            return 0;
        }
        return field_words
            .windows(phrase.len())
            .filter(|w| w == &phrase.as_slice())
            .count();
    }
    let needle = term.text.to_lowercase();
    field_words
        .iter()
        .filter(|w| {
            if term.prefix {
                w.starts_with(&needle)
            } else {
                **w == needle
            }
        })
        .count()
}

fn term_score(doc: &Document, term: &Term) -> f64 {
    let title = count_in(&words(&doc.title), term) as f64;
    let author = count_in(&words(&doc.author), term) as f64;
    match term.field {
        Field::Title => title,
        Field::Author => author,
        Field::Any => 2.0 * title + author + count_in(&words(&doc.contents), term) as f64,
    }
}

fn score(doc: &Document, query: &ParsedQuery) -> Option<f64> {
    if let Some(dt) = &query.doc_type {
        if &doc.doc_type != dt {
            return None;
        }
    }
    if query.excluded.iter().any(|t| term_score(doc, t) > 0.0) {
        return None;
    }
    let mut total = 0.0;
    for t in &query.required {
        let s = term_score(doc, t);
        if s == 0.0 {
            return None;
        }
        total += s;
    }
    let optional: f64 = query.optional.iter().map(|t| term_score(doc, t)).sum();
    if query.required.is_empty() && optional == 0.0 {
        return None;
    }
    Some(total + optional)
}

#[async_trait]
impl FullTextEngine for InMemoryEngine {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn add(&self, doc: &Document) -> Result<()> {
        self.pending.lock().unwrap().push(doc.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            bail!("commit failed: index is read-only");
        }
        let queued: Vec<Document> = std::mem::take(&mut *self.pending.lock().unwrap());
        self.committed.write().unwrap().extend(queued);
        Ok(())
    }

    async fn delete_by_key(&self, key: &CompositeKey) -> Result<usize> {
        self.pending.lock().unwrap().retain(|d| &d.key() != key);
        let mut committed = self.committed.write().unwrap();
        let before = committed.len();
        committed.retain(|d| &d.key() != key);
        Ok(before - committed.len())
    }

    async fn clear(&self) -> Result<()> {
        self.pending.lock().unwrap().clear();
        self.committed.write().unwrap().clear();
        Ok(())
    }

    async fn find(&self, query: &ParsedQuery, limit: usize) -> Result<Vec<EngineHit>> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("index is not available");
        }
        let committed = self.committed.read().unwrap();
        let mut hits: Vec<EngineHit> = committed
            .iter()
            .filter_map(|d| score(d, query).map(|s| EngineHit::from_document(d, s)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn entries(&self) -> Result<Vec<IndexedKey>> {
        Ok(self
            .committed
            .read()
            .unwrap()
            .iter()
            .map(|d| IndexedKey {
                key: d.key(),
                shadow_id: d.shadow_id,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.committed.read().unwrap().len())
    }
}
