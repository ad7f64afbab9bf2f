//! Sync progress events.
//!
//! The sync engine reports what it is doing through a
//! [`SyncProgressReporter`]. Reporters live with the caller (the CLI writes
//! them to stderr); [`NoProgress`] discards everything.

/// Phase of a sync run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncPhase {
    Rebuild,
    Add,
    Update,
    Delete,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Rebuild => "rebuild",
            SyncPhase::Add => "add",
            SyncPhase::Update => "update",
            SyncPhase::Delete => "delete",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// Adapter is enumerating its instances. Total unknown.
    Discovering { doc_type: String },
    /// `n` of `total` records of one doctype/item type handled in a phase.
    Working {
        phase: SyncPhase,
        doc_type: String,
        item_type: String,
        n: u64,
        total: u64,
    },
    /// A batch of engine writes was committed.
    Committed { phase: SyncPhase, documents: u64 },
}

/// Receives progress events from the sync engine.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// No-op reporter.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}
