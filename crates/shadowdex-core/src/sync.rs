//! Full and differential synchronization.
//!
//! The [`SyncEngine`] is the only writer to the full-text engine and the
//! shadow catalog. It runs in one of two modes:
//!
//! - **Full rebuild**: clear both stores and re-extract every instance of
//!   every enabled adapter, committing every `commit_every` documents.
//! - **Differential**: for every enabled adapter and each of its sync
//!   descriptors, compare the doc ids recorded in the catalog with the live
//!   source rows and apply only the difference.
//!
//! # Differential algorithm
//!
//! All three phases are the same function over `(existing, candidates)`:
//!
//! | Phase | Candidates | Work set |
//! |-------|-----------|----------|
//! | add | `created > addition_cursor` | `candidates \ existing` |
//! | update | `modified > update_cursor` | `candidates ∩ existing` |
//! | delete | every live row | `existing \ candidates` |
//!
//! A differential run executes delete, update, then add. Each phase commits
//! once at the end (and every `commit_every` documents before that); its
//! cursor moves to the run start only after that commit succeeds.
//!
//! # Ordering
//!
//! On removal the engine entry is deleted before the catalog row. On
//! addition the catalog row is inserted before the engine add. A run that
//! dies half-way can therefore leave a catalog row without an engine entry
//! (an orphan the consistency sweep reports), never the reverse.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::adapter::{AdapterRegistry, SourceAdapter};
use crate::catalog::ShadowCatalog;
use crate::error::{SkipReason, SyncError};
use crate::index::FullTextEngine;
use crate::models::{CompositeKey, Document, SyncDescriptor, SyncState};
use crate::progress::{NoProgress, SyncPhase, SyncProgressEvent, SyncProgressReporter};
use crate::source::{SourceStore, TimeBound};

/// One differential phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Add,
    Update,
    Delete,
}

impl Phase {
    /// Delete first, then update, then add.
    pub const ALL: [Phase; 3] = [Phase::Delete, Phase::Update, Phase::Add];

    pub fn as_str(&self) -> &'static str {
        SyncPhase::from(*self).as_str()
    }

    fn bound(&self, state: &SyncState) -> TimeBound {
        match self {
            Phase::Add => TimeBound::CreatedAfter(state.addition_cursor),
            Phase::Update => TimeBound::ModifiedAfter(state.update_cursor),
            Phase::Delete => TimeBound::Unbounded,
        }
    }
}

impl From<Phase> for SyncPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Add => SyncPhase::Add,
            Phase::Update => SyncPhase::Update,
            Phase::Delete => SyncPhase::Delete,
        }
    }
}

/// The doc ids a phase has to act on, in ascending order.
pub fn reconcile(existing: &[String], candidates: &[String], phase: Phase) -> Vec<String> {
    let existing: BTreeSet<&str> = existing.iter().map(String::as_str).collect();
    let candidates: BTreeSet<&str> = candidates.iter().map(String::as_str).collect();
    let ids: Vec<&str> = match phase {
        Phase::Add => candidates.difference(&existing).copied().collect(),
        Phase::Update => candidates.intersection(&existing).copied().collect(),
        Phase::Delete => existing.difference(&candidates).copied().collect(),
    };
    ids.into_iter().map(str::to_string).collect()
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Commit the engine after this many added documents.
    pub commit_every: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { commit_every: 100 }
    }
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub commits: u64,
    pub skipped: Vec<SkipReason>,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.added += other.added;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.commits += other.commits;
        self.skipped.extend(other.skipped);
    }

    fn skip(&mut self, reason: SkipReason) {
        warn!("{}", reason);
        self.skipped.push(reason);
    }
}

/// Adds written since the last commit.
#[derive(Default)]
struct Batch {
    keys: Vec<CompositeKey>,
}

/// Drives the engine and catalog from the registered adapters.
pub struct SyncEngine<'a, E: ?Sized, C: ?Sized, S: ?Sized> {
    engine: &'a E,
    catalog: &'a C,
    source: &'a S,
    adapters: &'a AdapterRegistry,
    options: SyncOptions,
    progress: &'a dyn SyncProgressReporter,
}

impl<'a, E, C, S> SyncEngine<'a, E, C, S>
where
    E: FullTextEngine + ?Sized,
    C: ShadowCatalog + ?Sized,
    S: SourceStore + ?Sized,
{
    pub fn new(engine: &'a E, catalog: &'a C, source: &'a S, adapters: &'a AdapterRegistry) -> Self {
        Self {
            engine,
            catalog,
            source,
            adapters,
            options: SyncOptions::default(),
            progress: &NoProgress,
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Rebuild the whole index from the enabled adapters.
    ///
    /// Sets `state.busy` for the duration and clears it only on success.
    /// Both cursors move to [`watermark(now)`](watermark) on success.
    pub async fn full_rebuild(&self, state: &mut SyncState, now: i64) -> Result<SyncReport, SyncError> {
        self.ensure_available().await?;
        if state.busy {
            return Err(SyncError::Busy);
        }
        state.busy = true;

        let phase = SyncPhase::Rebuild;
        let abort = |e: anyhow::Error| SyncError::aborted(phase.as_str(), e);

        info!("full rebuild started");
        self.engine.clear().await.map_err(abort)?;
        self.catalog.truncate().await.map_err(abort)?;

        let mut report = SyncReport::default();
        let mut batch = Batch::default();

        for adapter in self.adapters.enabled() {
            let doc_type = adapter.doc_type();
            self.progress.report(SyncProgressEvent::Discovering {
                doc_type: doc_type.to_string(),
            });

            let instances = match adapter.iterate().await {
                Ok(instances) => instances,
                Err(e) => {
                    report.skip(SkipReason::AdapterMissing {
                        doc_type: doc_type.to_string(),
                        message: format!("{:#}", e),
                    });
                    continue;
                }
            };

            let total = instances.len() as u64;
            for (n, instance) in instances.iter().enumerate() {
                let docs = match adapter.extract_for_index(instance).await {
                    Ok(docs) => docs,
                    Err(e) => {
                        report.skip(SkipReason::ExtractionFailure {
                            doc_type: doc_type.to_string(),
                            item_type: instance.item_type.clone(),
                            doc_id: instance.id.clone(),
                            message: format!("{:#}", e),
                        });
                        continue;
                    }
                };
                for doc in docs {
                    self.index_document(adapter, doc, now, &mut batch)
                        .await
                        .map_err(abort)?;
                    report.added += 1;
                    self.commit_if_due(phase, &mut batch, &mut report).await?;
                }

                let n = n as u64 + 1;
                if n % 100 == 0 || n == total {
                    self.progress.report(SyncProgressEvent::Working {
                        phase,
                        doc_type: doc_type.to_string(),
                        item_type: instance.item_type.clone(),
                        n,
                        total,
                    });
                }
            }
            info!(doc_type, instances = total, "adapter rebuilt");
        }

        self.commit(phase, &mut batch, &mut report).await?;

        state.advance_addition(watermark(now));
        state.advance_update(watermark(now));
        state.busy = false;
        info!(added = report.added, skipped = report.skipped.len(), "full rebuild finished");
        Ok(report)
    }

    /// Run delete, update and add in that order.
    pub async fn run_differential(&self, state: &mut SyncState, now: i64) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for phase in Phase::ALL {
            report.absorb(self.run_phase(phase, state, now).await?);
        }
        Ok(report)
    }

    /// Run one differential phase over every enabled adapter.
    pub async fn run_phase(&self, phase: Phase, state: &mut SyncState, now: i64) -> Result<SyncReport, SyncError> {
        self.ensure_available().await?;
        if state.busy {
            return Err(SyncError::Busy);
        }

        let mut report = SyncReport::default();
        let mut batch = Batch::default();

        for adapter in self.adapters.enabled() {
            for desc in adapter.sync_descriptors() {
                let result = self
                    .run_descriptor(phase, adapter, &desc, state, now, &mut batch, &mut report)
                    .await;
                if let Err(e) = result {
                    self.discard_uncommitted(phase, &mut batch).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.commit(phase.into(), &mut batch, &mut report).await {
            self.discard_uncommitted(phase, &mut batch).await;
            return Err(e);
        }

        match phase {
            Phase::Add => state.advance_addition(watermark(now)),
            Phase::Update => state.advance_update(watermark(now)),
            Phase::Delete => {}
        }
        info!(
            phase = phase.as_str(),
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            "phase finished"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_descriptor(
        &self,
        phase: Phase,
        adapter: &dyn SourceAdapter,
        desc: &SyncDescriptor,
        state: &SyncState,
        now: i64,
        batch: &mut Batch,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let abort = |e: anyhow::Error| SyncError::aborted(phase.as_str(), e);
        let doc_type = adapter.doc_type();

        let existing = self
            .catalog
            .existing_ids(doc_type, &desc.item_type)
            .await
            .map_err(abort)?;
        let candidates = self
            .source
            .live_ids(desc, phase.bound(state))
            .await
            .map_err(abort)?;
        let work = reconcile(&existing, &candidates, phase);
        debug!(
            phase = phase.as_str(),
            doc_type,
            item_type = %desc.item_type,
            existing = existing.len(),
            candidates = candidates.len(),
            work = work.len(),
            "reconciled"
        );

        let total = work.len() as u64;
        for doc_id in &work {
            let key = CompositeKey::new(doc_id, doc_type, &desc.item_type);
            match phase {
                Phase::Delete => {
                    self.remove(&key).await.map_err(abort)?;
                    report.deleted += 1;
                }
                Phase::Add => {
                    if let Some(doc) = self.build(adapter, &key, report).await {
                        self.index_document(adapter, doc, now, batch)
                            .await
                            .map_err(abort)?;
                        report.added += 1;
                    }
                }
                Phase::Update => {
                    // Build first so a failed lookup leaves the old entry in place.
                    if let Some(doc) = self.build(adapter, &key, report).await {
                        self.remove(&key).await.map_err(abort)?;
                        self.index_document(adapter, doc, now, batch)
                            .await
                            .map_err(abort)?;
                        report.updated += 1;
                    }
                }
            }
            self.commit_if_due(phase.into(), batch, report).await?;
        }

        if total > 0 {
            self.progress.report(SyncProgressEvent::Working {
                phase: phase.into(),
                doc_type: doc_type.to_string(),
                item_type: desc.item_type.clone(),
                n: total,
                total,
            });
        }
        Ok(())
    }

    async fn ensure_available(&self) -> Result<(), SyncError> {
        if self.engine.is_available().await {
            Ok(())
        } else {
            Err(SyncError::EngineUnavailable(
                "index has not been created or cannot be opened".to_string(),
            ))
        }
    }

    /// Single-document lookup; failures become skips.
    async fn build(
        &self,
        adapter: &dyn SourceAdapter,
        key: &CompositeKey,
        report: &mut SyncReport,
    ) -> Option<Document> {
        let failure = |message: String| SkipReason::ExtractionFailure {
            doc_type: key.doc_type.clone(),
            item_type: key.item_type.clone(),
            doc_id: key.doc_id.clone(),
            message,
        };
        match adapter.fetch_single(&key.doc_id, &key.item_type).await {
            Ok(Some(doc)) if &doc.key() == key => Some(doc),
            Ok(Some(doc)) => {
                report.skip(failure(format!("adapter returned a document for {}", doc.key())));
                None
            }
            Ok(None) => {
                report.skip(failure("adapter returned no document".to_string()));
                None
            }
            Err(e) => {
                report.skip(failure(format!("{:#}", e)));
                None
            }
        }
    }

    /// Catalog row first, then the engine add.
    async fn index_document(
        &self,
        adapter: &dyn SourceAdapter,
        mut doc: Document,
        now: i64,
        batch: &mut Batch,
    ) -> anyhow::Result<()> {
        if doc.path.is_empty() {
            doc.path = adapter.path().to_string();
        }
        let desc = self.catalog.insert(&doc, now).await?;
        doc.shadow_id = Some(desc.shadow_id);
        self.engine.add(&doc).await?;
        batch.keys.push(doc.key());
        Ok(())
    }

    /// Engine entry first, then the catalog row. Missing entries are fine.
    async fn remove(&self, key: &CompositeKey) -> anyhow::Result<()> {
        let from_engine = self.engine.delete_by_key(key).await?;
        let from_catalog = self.catalog.delete_by_key(key).await?;
        if from_engine != from_catalog {
            debug!(%key, from_engine, from_catalog, "removed entries do not match");
        }
        Ok(())
    }

    async fn commit_if_due(
        &self,
        phase: SyncPhase,
        batch: &mut Batch,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if batch.keys.len() >= self.options.commit_every.max(1) {
            self.commit(phase, batch, report).await?;
        }
        Ok(())
    }

    async fn commit(
        &self,
        phase: SyncPhase,
        batch: &mut Batch,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        self.engine
            .commit()
            .await
            .map_err(|e| SyncError::aborted(phase.as_str(), e))?;
        report.commits += 1;
        self.progress.report(SyncProgressEvent::Committed {
            phase,
            documents: batch.keys.len() as u64,
        });
        batch.keys.clear();
        Ok(())
    }

    /// After an aborted add phase, drop the catalog rows of adds that never
    /// reached a commit so the retried window picks them up again. Update
    /// rows are kept: their descriptors make the retry rebuild them.
    async fn discard_uncommitted(&self, phase: Phase, batch: &mut Batch) {
        if phase != Phase::Add {
            return;
        }
        for key in batch.keys.drain(..) {
            if let Err(e) = self.remove(&key).await {
                warn!(%key, "could not discard uncommitted add: {:#}", e);
            }
        }
    }
}

/// Cursor value for a run that started at `now`.
///
/// Source timestamps have one-second resolution and the time bounds are
/// strict, so a row stamped later within second `now` must stay above the
/// cursor.
pub fn watermark(now: i64) -> i64 {
    now - 1
}
