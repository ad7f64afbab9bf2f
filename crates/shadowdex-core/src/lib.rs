//! # Shadowdex Core
//!
//! Storage-agnostic logic for Shadowdex: the document model, the traits
//! that stand in for the full-text engine, the shadow catalog and the
//! relational source store, the differential sync engine, and the
//! access-filtered query engine.
//!
//! This crate contains no sqlx, no tokio runtime and no filesystem I/O.
//! Every backend is reached through a trait; the `memory` submodules
//! provide in-process implementations used by tests.
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │SourceAdapters│──▶│ SyncEngine  │──▶│ FullTextEngine│
//! │ + SourceStore│   │ add/upd/del │──▶│ ShadowCatalog │
//! └──────────────┘   └─────────────┘   └───────┬───────┘
//!                                              │
//!                    ┌─────────────┐           │
//!                    │ QueryEngine │◀──────────┘
//!                    │ parse→filter│
//!                    │  →paginate  │
//!                    └─────────────┘
//! ```

pub mod access;
pub mod adapter;
pub mod cache;
pub mod catalog;
pub mod consistency;
pub mod error;
pub mod index;
pub mod models;
pub mod paging;
pub mod progress;
pub mod query;
pub mod search;
pub mod source;
pub mod sync;

pub use access::{AccessGuard, CapabilityPolicy, CourseAccess};
pub use adapter::{Access, AccessRequest, AdapterRegistry, SourceAdapter};
pub use cache::ResultCache;
pub use error::SyncError;
pub use models::{
    CompositeKey, Document, DocumentDescriptor, SourceInstance, SyncDescriptor, SyncState,
    UserContext,
};
pub use search::{search, SearchPage, SearchRequest};
pub use sync::{Phase, SyncEngine, SyncOptions, SyncReport};
