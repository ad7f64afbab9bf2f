//! Relational source store abstraction.
//!
//! The sync engine never reads the system-of-record's tables itself. It
//! hands a [`SyncDescriptor`] and a [`TimeBound`] to a [`SourceStore`] and
//! gets back the ids of the live rows that qualify.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SyncDescriptor;

/// Which timestamp column bounds a live-id query, and from when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    /// `created_field > t`
    CreatedAfter(i64),
    /// `modified_field > t`
    ModifiedAfter(i64),
    /// every row matching the descriptor
    Unbounded,
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Ids of rows in `desc.source_table` that match `desc.extra_where`
    /// (through `desc.extra_join`) and the time bound.
    async fn live_ids(&self, desc: &SyncDescriptor, bound: TimeBound) -> Result<Vec<String>>;
}
