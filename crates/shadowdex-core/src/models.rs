//! Core data models used throughout Shadowdex.
//!
//! These types represent the documents pushed to the full-text engine, the
//! descriptors mirrored in the shadow catalog, and the per-adapter sync
//! descriptors that tell the sync engine where source rows live.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The stable identity of an indexed document: `(doc_id, doc_type, item_type)`.
///
/// Never changes while the source record exists. Both the engine and the
/// catalog support exact-match deletion by this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey {
    pub doc_id: String,
    pub doc_type: String,
    pub item_type: String,
}

impl CompositeKey {
    pub fn new(
        doc_id: impl Into<String>,
        doc_type: impl Into<String>,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            doc_type: doc_type.into(),
            item_type: item_type.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.doc_type, self.item_type, self.doc_id)
    }
}

/// A unit pushed to the full-text engine.
///
/// Produced by a [`SourceAdapter`](crate::adapter::SourceAdapter) either from
/// an iterated instance (full rebuild) or from a single-document lookup
/// (differential phases). `contents` is indexed but never projected back
/// into query hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Source-native identifier.
    pub doc_id: String,
    /// Identity of the owning adapter.
    pub doc_type: String,
    /// Sub-classification within the doctype (e.g. `"head"` vs `"post"`).
    pub item_type: String,
    /// Opaque access-context reference.
    pub context_id: i64,
    pub course_id: i64,
    pub group_id: i64,
    /// Origin attribution; `0` or `-1` mean "none".
    pub user_id: i64,
    pub title: String,
    pub author: String,
    pub contents: String,
    pub url: String,
    /// Source-native timestamp (Unix seconds).
    pub date: i64,
    /// Owner of the capability check for this document.
    pub path: String,
    /// Serialized type-specific data.
    pub payload: String,
    /// Extra keyed fields for type-specific filtering.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    /// Catalog row this document is linked to. Set by the sync engine.
    #[serde(default)]
    pub shadow_id: Option<i64>,
}

impl Document {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.doc_id, &self.doc_type, &self.item_type)
    }
}

/// A persisted shadow catalog row mirroring one document in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub shadow_id: i64,
    pub doc_type: String,
    pub doc_id: String,
    pub item_type: String,
    pub title: String,
    pub url: String,
    /// Wall-clock time of the sync write that created this row.
    pub updated_at: i64,
    /// Source-native timestamp copied from [`Document::date`].
    pub doc_date: i64,
    pub course_id: i64,
    /// Never negative.
    pub group_id: i64,
}

impl DocumentDescriptor {
    /// Build the descriptor for `doc` under an already-assigned shadow id.
    pub fn from_document(shadow_id: i64, doc: &Document, updated_at: i64) -> Self {
        Self {
            shadow_id,
            doc_type: doc.doc_type.clone(),
            doc_id: doc.doc_id.clone(),
            item_type: doc.item_type.clone(),
            title: doc.title.clone(),
            url: doc.url.clone(),
            updated_at,
            doc_date: doc.date,
            course_id: doc.course_id,
            group_id: doc.group_id.max(0),
        }
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.doc_id, &self.doc_type, &self.item_type)
    }
}

/// How to find the source rows of one item type of one adapter.
///
/// One adapter may emit several descriptors, one per item type. The sync
/// engine never merges descriptors across adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDescriptor {
    pub id_column: String,
    pub source_table: String,
    pub created_field: String,
    pub modified_field: String,
    pub item_type: String,
    #[serde(default)]
    pub extra_where: Option<String>,
    #[serde(default)]
    pub extra_join: Option<String>,
}

impl SyncDescriptor {
    pub fn new(
        id_column: impl Into<String>,
        source_table: impl Into<String>,
        created_field: impl Into<String>,
        modified_field: impl Into<String>,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            id_column: id_column.into(),
            source_table: source_table.into(),
            created_field: created_field.into(),
            modified_field: modified_field.into(),
            item_type: item_type.into(),
            extra_where: None,
            extra_join: None,
        }
    }

    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.extra_where = Some(clause.into());
        self
    }

    pub fn with_join(mut self, clause: impl Into<String>) -> Self {
        self.extra_join = Some(clause.into());
        self
    }
}

/// Watermarks and busy flag carried between sync runs.
///
/// Passed into every run by mutable reference and persisted by the caller
/// afterwards. Cursors only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Everything created at or before this instant has been added.
    pub addition_cursor: i64,
    /// Everything modified at or before this instant has been updated.
    pub update_cursor: i64,
    /// Set while a full rebuild runs; left set if it fails.
    pub busy: bool,
}

impl SyncState {
    pub fn advance_addition(&mut self, to: i64) {
        self.addition_cursor = self.addition_cursor.max(to);
    }

    pub fn advance_update(&mut self, to: i64) {
        self.update_cursor = self.update_cursor.max(to);
    }
}

/// One item yielded by an adapter's iterator during a full rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInstance {
    pub id: String,
    pub item_type: String,
    /// Adapter-private row data handed back to `extract_for_index`.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The user a query is evaluated for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: i64,
    pub is_admin: bool,
    pub is_guest: bool,
}

impl UserContext {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: true,
            is_guest: false,
        }
    }

    pub fn guest() -> Self {
        Self {
            user_id: 0,
            is_admin: false,
            is_guest: true,
        }
    }
}
