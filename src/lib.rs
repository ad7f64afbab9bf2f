//! # Shadowdex
//!
//! A full-text index that shadows a relational system-of-record.
//!
//! Source tables are described in TOML as adapters. The indexer mirrors
//! their rows into an SQLite FTS5 index plus a document catalog, keeps both
//! current with differential add, update and delete runs, and the search
//! side filters every hit by what the asking user may see.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │ source.sqlite│──▶│  SyncEngine  │──▶│     index.sqlite    │
//! │ TableAdapter │   │ (core crate) │   │ FTS5 + catalog +    │
//! └──────────────┘   └──────────────┘   │ sync state + lock   │
//!                                       └──────────┬──────────┘
//!                                                  ▼
//!                                          ┌──────────────┐
//!                                          │ SearchSession│
//!                                          │ access filter│
//!                                          └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connections |
//! | [`migrate`] | Schema migrations |
//! | [`fts_engine`] | FTS5-backed full-text engine |
//! | [`sqlite_catalog`] | Document catalog |
//! | [`sqlite_source`] | Live-id queries against the source |
//! | [`table_adapter`] | Config-driven source adapters |
//! | [`course_access`] | Course visibility gate |
//! | [`state`] | Watermarks, busy flag and writer lock |
//! | [`indexer`] | `sdx index` / `sdx sync` |
//! | [`search`] | `sdx search` and [`search::SearchSession`] |
//! | [`stats`] | `sdx stats` / `sdx check` / `sdx unlock` |

pub mod config;
pub mod course_access;
pub mod db;
pub mod fts_engine;
pub mod indexer;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sources;
pub mod sqlite_catalog;
pub mod sqlite_source;
pub mod state;
pub mod stats;
pub mod table_adapter;
