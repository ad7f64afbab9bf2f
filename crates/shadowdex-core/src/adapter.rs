//! Source adapters and the registry that resolves them.
//!
//! A [`SourceAdapter`] maps one content type of the system-of-record to
//! indexable [`Document`]s. Adapters are registered once at startup in an
//! [`AdapterRegistry`], keyed by their doctype; the sync engine walks the
//! enabled ones and the query engine resolves the owner of each hit through
//! it.
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │            AdapterRegistry             │
//! │  forum ─▶ Box<dyn SourceAdapter>       │
//! │  wiki  ─▶ Box<dyn SourceAdapter>       │
//! │  glossary (disabled) ─▶ ...            │
//! └───────────────┬────────────────────────┘
//!        ┌────────┴────────┐
//!        ▼                 ▼
//!    SyncEngine      access filter
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::models::{Document, SourceInstance, SyncDescriptor, UserContext};

/// Outcome of a capability predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
    /// The adapter has no predicate for this item. The caller's
    /// [`CapabilityPolicy`](crate::access::CapabilityPolicy) decides.
    Unresolved,
}

impl From<bool> for Access {
    fn from(allowed: bool) -> Self {
        if allowed {
            Access::Allow
        } else {
            Access::Deny
        }
    }
}

/// The indexed fields a capability predicate gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub path: &'a str,
    pub item_type: &'a str,
    pub doc_id: &'a str,
    pub group_id: i64,
    pub context_id: i64,
}

/// One content type of the system-of-record.
///
/// # Lifecycle
///
/// 1. The adapter is registered via [`AdapterRegistry::register`].
/// 2. A full rebuild calls [`iterate`](SourceAdapter::iterate) and then
///    [`extract_for_index`](SourceAdapter::extract_for_index) per instance.
/// 3. Differential runs query the source store with
///    [`sync_descriptors`](SourceAdapter::sync_descriptors) and build
///    documents one by one with [`fetch_single`](SourceAdapter::fetch_single).
/// 4. Queries call [`check_access`](SourceAdapter::check_access) per hit.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry key and the `doc_type` stamped on every document.
    fn doc_type(&self) -> &str;

    /// Owner identifier written to [`Document::path`].
    fn path(&self) -> &str {
        self.doc_type()
    }

    /// One-line description used by `sdx sources`.
    fn description(&self) -> &str {
        ""
    }

    /// Where this adapter's source rows live, one entry per item type.
    fn sync_descriptors(&self) -> Vec<SyncDescriptor>;

    /// Enumerate every instance to index. Finite and restartable.
    async fn iterate(&self) -> Result<Vec<SourceInstance>>;

    /// Turn one instance into zero or more documents.
    async fn extract_for_index(&self, instance: &SourceInstance) -> Result<Vec<Document>>;

    /// Build the document for a single source row, or `None` if the row no
    /// longer yields one.
    async fn fetch_single(&self, doc_id: &str, item_type: &str) -> Result<Option<Document>>;

    /// Decide whether `user` may see the indexed item.
    ///
    /// The default has no predicate and returns [`Access::Unresolved`].
    async fn check_access(&self, _user: &UserContext, _req: &AccessRequest<'_>) -> Result<Access> {
        Ok(Access::Unresolved)
    }
}

/// Registry of source adapters keyed by doctype.
///
/// Disabled adapters stay registered: the sync engine skips them, but the
/// query engine still resolves them so their capability predicates keep
/// guarding entries left in the index.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
    disabled: BTreeSet<String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            disabled: BTreeSet::new(),
        }
    }

    /// Register an adapter. A later registration for the same doctype
    /// replaces the earlier one.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.retain(|a| a.doc_type() != adapter.doc_type());
        self.adapters.push(adapter);
    }

    /// Soft-disable a doctype.
    pub fn disable(&mut self, doc_type: &str) {
        self.disabled.insert(doc_type.to_string());
    }

    pub fn is_enabled(&self, doc_type: &str) -> bool {
        !self.disabled.contains(doc_type)
    }

    /// All registered adapters, enabled or not.
    pub fn adapters(&self) -> &[Box<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Adapters the sync engine should visit.
    pub fn enabled(&self) -> impl Iterator<Item = &dyn SourceAdapter> + '_ {
        self.adapters
            .iter()
            .filter(|a| self.is_enabled(a.doc_type()))
            .map(|a| a.as_ref())
    }

    pub fn get(&self, doc_type: &str) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.doc_type() == doc_type)
            .map(|a| a.as_ref())
    }

    /// Find the adapter owning an indexed item: by `path` first, then by
    /// `doc_type`.
    pub fn resolve(&self, path: &str, doc_type: &str) -> Option<&dyn SourceAdapter> {
        if !path.is_empty() {
            if let Some(a) = self.adapters.iter().find(|a| a.path() == path) {
                return Some(a.as_ref());
            }
        }
        self.get(doc_type)
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
