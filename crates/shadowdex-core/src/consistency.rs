//! Consistency sweep between the engine and the shadow catalog.
//!
//! After a successful run every committed engine entry has exactly one
//! catalog row with the same composite key and shadow id, and vice versa.
//! Interrupted runs can leave orphan rows behind; this sweep reports them
//! and anything else that breaks the pairing.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::catalog::ShadowCatalog;
use crate::index::{FullTextEngine, IndexedKey};
use crate::models::{CompositeKey, DocumentDescriptor};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    pub engine_entries: usize,
    pub descriptors: usize,
    /// Catalog rows with no engine entry (left by an interrupted run).
    pub orphan_descriptors: Vec<DocumentDescriptor>,
    /// Engine entries no catalog row points at.
    pub unreachable_entries: Vec<IndexedKey>,
    /// Keys with more than one engine entry or catalog row.
    pub duplicate_keys: Vec<CompositeKey>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphan_descriptors.is_empty()
            && self.unreachable_entries.is_empty()
            && self.duplicate_keys.is_empty()
    }
}

pub async fn check<E, C>(engine: &E, catalog: &C) -> Result<ConsistencyReport>
where
    E: FullTextEngine + ?Sized,
    C: ShadowCatalog + ?Sized,
{
    let entries = engine.entries().await?;
    let descriptors = catalog.all().await?;

    let mut by_key: BTreeMap<CompositeKey, (Vec<&IndexedKey>, Vec<&DocumentDescriptor>)> =
        BTreeMap::new();
    for e in &entries {
        by_key.entry(e.key.clone()).or_default().0.push(e);
    }
    for d in &descriptors {
        by_key.entry(d.key()).or_default().1.push(d);
    }

    let mut report = ConsistencyReport {
        engine_entries: entries.len(),
        descriptors: descriptors.len(),
        ..Default::default()
    };

    for (key, (in_engine, in_catalog)) in by_key {
        if in_engine.len() > 1 || in_catalog.len() > 1 {
            report.duplicate_keys.push(key.clone());
        }
        if in_engine.is_empty() {
            report
                .orphan_descriptors
                .extend(in_catalog.iter().map(|d| (*d).clone()));
            continue;
        }
        for e in in_engine {
            let linked = in_catalog.iter().any(|d| Some(d.shadow_id) == e.shadow_id);
            if !linked {
                report.unreachable_entries.push(e.clone());
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use crate::index::memory::InMemoryEngine;
    use crate::models::Document;

    fn doc(id: &str) -> Document {
        Document {
            doc_id: id.into(),
            doc_type: "wiki".into(),
            item_type: "page".into(),
            title: format!("Page {}", id),
            ..Default::default()
        }
    }

    async fn index(engine: &InMemoryEngine, catalog: &InMemoryCatalog, mut d: Document) {
        let desc = catalog.insert(&d, 1).await.unwrap();
        d.shadow_id = Some(desc.shadow_id);
        engine.add(&d).await.unwrap();
    }

    #[tokio::test]
    async fn paired_stores_are_consistent() {
        let engine = InMemoryEngine::new();
        let catalog = InMemoryCatalog::new();
        index(&engine, &catalog, doc("1")).await;
        index(&engine, &catalog, doc("2")).await;
        engine.commit().await.unwrap();

        let report = check(&engine, &catalog).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.engine_entries, 2);
        assert_eq!(report.descriptors, 2);
    }

    #[tokio::test]
    async fn uncommitted_adds_leave_orphans() {
        let engine = InMemoryEngine::new();
        let catalog = InMemoryCatalog::new();
        index(&engine, &catalog, doc("1")).await;

        let report = check(&engine, &catalog).await.unwrap();
        assert_eq!(report.orphan_descriptors.len(), 1);
        assert_eq!(report.orphan_descriptors[0].doc_id, "1");
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn entries_without_rows_and_duplicates_are_reported() {
        let engine = InMemoryEngine::new();
        let catalog = InMemoryCatalog::new();
        engine.add(&doc("1")).await.unwrap();
        index(&engine, &catalog, doc("2")).await;
        index(&engine, &catalog, doc("2")).await;
        engine.commit().await.unwrap();

        let report = check(&engine, &catalog).await.unwrap();
        assert_eq!(report.unreachable_entries.len(), 1);
        assert_eq!(report.unreachable_entries[0].key.doc_id, "1");
        assert_eq!(report.duplicate_keys, vec![CompositeKey::new("2", "wiki", "page")]);
    }
}
