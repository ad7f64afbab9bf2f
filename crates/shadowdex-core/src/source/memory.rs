//! In-memory source store and adapter for tests.
//!
//! [`InMemorySource`] holds rows of any number of "tables". A descriptor's
//! `extra_where` is read as a tag the row must carry, which is enough to
//! model several item types sharing one table. [`InMemoryAdapter`] turns
//! those rows into documents.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::adapter::{Access, AccessRequest, SourceAdapter};
use crate::models::{Document, SourceInstance, SyncDescriptor, UserContext};

use super::{SourceStore, TimeBound};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    pub table: String,
    pub id: String,
    pub created: i64,
    pub modified: i64,
    pub title: String,
    pub contents: String,
    pub course_id: i64,
    pub user_id: i64,
    pub tag: Option<String>,
}

impl SourceRow {
    pub fn new(table: &str, id: &str, title: &str, at: i64) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            created: at,
            modified: at,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn matches(&self, desc: &SyncDescriptor) -> bool {
        self.table == desc.source_table
            && desc
                .extra_where
                .as_ref()
                .map_or(true, |w| self.tag.as_deref() == Some(w.as_str()))
    }
}

#[derive(Default)]
pub struct InMemorySource {
    rows: RwLock<Vec<SourceRow>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row (by table and id).
    pub fn upsert(&self, row: SourceRow) {
        let mut rows = self.rows.write().unwrap();
        rows.retain(|r| !(r.table == row.table && r.id == row.id));
        rows.push(row);
    }

    pub fn remove(&self, table: &str, id: &str) {
        self.rows
            .write()
            .unwrap()
            .retain(|r| !(r.table == table && r.id == id));
    }

    pub fn get(&self, table: &str, id: &str) -> Option<SourceRow> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .find(|r| r.table == table && r.id == id)
            .cloned()
    }

    fn matching(&self, desc: &SyncDescriptor) -> Vec<SourceRow> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.matches(desc))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SourceStore for InMemorySource {
    async fn live_ids(&self, desc: &SyncDescriptor, bound: TimeBound) -> Result<Vec<String>> {
        Ok(self
            .matching(desc)
            .into_iter()
            .filter(|r| match bound {
                TimeBound::CreatedAfter(t) => r.created > t,
                TimeBound::ModifiedAfter(t) => r.modified > t,
                TimeBound::Unbounded => true,
            })
            .map(|r| r.id)
            .collect())
    }
}

/// Adapter over one table of an [`InMemorySource`].
pub struct InMemoryAdapter {
    doc_type: String,
    source: Arc<InMemorySource>,
    descriptors: Vec<SyncDescriptor>,
    denied: RwLock<BTreeSet<String>>,
    broken: RwLock<BTreeSet<String>>,
    with_predicate: bool,
}

impl InMemoryAdapter {
    /// One descriptor per `(item_type, tag)`; a `None` tag matches every row.
    pub fn new(doc_type: &str, source: Arc<InMemorySource>, items: &[(&str, Option<&str>)]) -> Self {
        let descriptors = items
            .iter()
            .map(|(item_type, tag)| {
                let d = SyncDescriptor::new("id", doc_type, "created", "modified", *item_type);
                match tag {
                    Some(t) => d.with_where(*t),
                    None => d,
                }
            })
            .collect();
        Self {
            doc_type: doc_type.into(),
            source,
            descriptors,
            denied: RwLock::new(BTreeSet::new()),
            broken: RwLock::new(BTreeSet::new()),
            with_predicate: true,
        }
    }

    /// Drop the capability predicate: every check returns `Unresolved`.
    pub fn without_predicate(mut self) -> Self {
        self.with_predicate = false;
        self
    }

    /// Deny access to this doc id for everyone but its owner.
    pub fn deny(&self, doc_id: &str) {
        self.denied.write().unwrap().insert(doc_id.into());
    }

    /// Make extraction of this doc id fail.
    pub fn break_record(&self, doc_id: &str) {
        self.broken.write().unwrap().insert(doc_id.into());
    }

    fn build(&self, row: &SourceRow, item_type: &str) -> Result<Document> {
        if self.broken.read().unwrap().contains(&row.id) {
            bail!("cannot extract record {}", row.id);
        }
        Ok(Document {
            doc_id: row.id.clone(),
            doc_type: self.doc_type.clone(),
            item_type: item_type.into(),
            course_id: row.course_id,
            user_id: row.user_id,
            title: row.title.clone(),
            contents: row.contents.clone(),
            url: format!("/{}/{}", self.doc_type, row.id),
            date: row.modified,
            path: self.doc_type.clone(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl SourceAdapter for InMemoryAdapter {
    fn doc_type(&self) -> &str {
        &self.doc_type
    }

    fn sync_descriptors(&self) -> Vec<SyncDescriptor> {
        self.descriptors.clone()
    }

    async fn iterate(&self) -> Result<Vec<SourceInstance>> {
        let mut out = Vec::new();
        for desc in &self.descriptors {
            for row in self.source.matching(desc) {
                out.push(SourceInstance {
                    id: row.id,
                    item_type: desc.item_type.clone(),
                    data: serde_json::Value::Null,
                });
            }
        }
        Ok(out)
    }

    async fn extract_for_index(&self, instance: &SourceInstance) -> Result<Vec<Document>> {
        match self.source.get(&self.doc_type, &instance.id) {
            Some(row) => Ok(vec![self.build(&row, &instance.item_type)?]),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_single(&self, doc_id: &str, item_type: &str) -> Result<Option<Document>> {
        let desc = self.descriptors.iter().find(|d| d.item_type == item_type);
        match (desc, self.source.get(&self.doc_type, doc_id)) {
            (Some(desc), Some(row)) if row.matches(desc) => Ok(Some(self.build(&row, item_type)?)),
            _ => Ok(None),
        }
    }

    async fn check_access(&self, user: &UserContext, req: &AccessRequest<'_>) -> Result<Access> {
        if !self.with_predicate {
            return Ok(Access::Unresolved);
        }
        if !self.denied.read().unwrap().contains(req.doc_id) {
            return Ok(Access::Allow);
        }
        let owner = self
            .source
            .get(&self.doc_type, req.doc_id)
            .map(|r| r.user_id);
        Ok(Access::from(owner == Some(user.user_id) && user.user_id > 0))
    }
}
