//! `sdx index` and `sdx sync`.
//!
//! Both commands take the writer lock, load the persisted [`SyncState`],
//! hand the SQLite-backed engine, catalog and source store to the core
//! [`SyncEngine`], and save the state again whatever the outcome. The
//! lock is released before the run's error (if any) is returned.

use anyhow::{anyhow, bail, Result};
use sqlx::SqlitePool;
use tracing::info;

use shadowdex_core::index::FullTextEngine;
use shadowdex_core::progress::SyncProgressReporter;
use shadowdex_core::{Phase, SyncEngine, SyncError, SyncOptions, SyncReport, SyncState};

use crate::config::Config;
use crate::db;
use crate::fts_engine::SqliteFtsEngine;
use crate::sqlite_catalog::SqliteCatalog;
use crate::sqlite_source::SqliteSourceStore;
use crate::state::{acquire_lock, load_state, release_lock, save_state};
use crate::table_adapter::build_registry;

/// Which phases `sdx sync` runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum PhaseSelection {
    All,
    Add,
    Update,
    Delete,
}

#[derive(Clone, Copy)]
enum Mode {
    Rebuild,
    Differential(PhaseSelection),
}

impl Mode {
    fn label(&self) -> &'static str {
        match self {
            Mode::Rebuild => "index",
            Mode::Differential(PhaseSelection::All) => "sync all",
            Mode::Differential(PhaseSelection::Add) => "sync add",
            Mode::Differential(PhaseSelection::Update) => "sync update",
            Mode::Differential(PhaseSelection::Delete) => "sync delete",
        }
    }
}

/// Full rebuild.
pub async fn run_index(config: &Config, progress: &dyn SyncProgressReporter) -> Result<()> {
    let (report, state) = execute(config, Mode::Rebuild, progress).await?;
    print_report(Mode::Rebuild, &report, &state);
    Ok(())
}

/// Differential run over the selected phases.
pub async fn run_sync(
    config: &Config,
    phases: PhaseSelection,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let mode = Mode::Differential(phases);
    let (report, state) = execute(config, mode, progress).await?;
    print_report(mode, &report, &state);
    Ok(())
}

/// Run a rebuild or differential sync without printing. Used by the CLI
/// commands above and by integration tests.
pub async fn sync_once(
    config: &Config,
    phases: Option<PhaseSelection>,
    progress: &dyn SyncProgressReporter,
) -> Result<(SyncReport, SyncState)> {
    let mode = match phases {
        Some(p) => Mode::Differential(p),
        None => Mode::Rebuild,
    };
    execute(config, mode, progress).await
}

async fn execute(
    config: &Config,
    mode: Mode,
    progress: &dyn SyncProgressReporter,
) -> Result<(SyncReport, SyncState)> {
    let pool = db::connect(config).await?;
    let engine = SqliteFtsEngine::new(pool.clone());
    if !engine.is_available().await {
        bail!(
            "Search index at {} is not initialized. Run `sdx init` first.",
            config.db.path.display()
        );
    }

    let now = chrono::Utc::now().timestamp();
    let Some(lock) = acquire_lock(&pool, config.sync.lock_timeout_secs, now).await? else {
        bail!("Another sync is running. Try again later or run `sdx unlock` if it died.");
    };
    info!(holder = lock.holder(), mode = mode.label(), "sync lock acquired");

    let outcome = run_locked(config, &pool, &engine, mode, progress, now).await;

    let released = release_lock(&pool, lock).await;
    let (report, state) = outcome?;
    released?;
    pool.close().await;
    Ok((report, state))
}

async fn run_locked(
    config: &Config,
    pool: &SqlitePool,
    engine: &SqliteFtsEngine,
    mode: Mode,
    progress: &dyn SyncProgressReporter,
    now: i64,
) -> Result<(SyncReport, SyncState)> {
    let mut state = load_state(pool).await?;
    let source_pool = db::connect_source(config).await?;
    let registry = build_registry(config, &source_pool);
    let catalog = SqliteCatalog::new(pool.clone());
    let source = SqliteSourceStore::new(source_pool.clone());

    let sync = SyncEngine::new(engine, &catalog, &source, &registry)
        .with_options(SyncOptions {
            commit_every: config.sync.commit_every,
        })
        .with_progress(progress);

    let result = match mode {
        Mode::Rebuild => sync.full_rebuild(&mut state, now).await,
        Mode::Differential(PhaseSelection::All) => sync.run_differential(&mut state, now).await,
        Mode::Differential(PhaseSelection::Add) => sync.run_phase(Phase::Add, &mut state, now).await,
        Mode::Differential(PhaseSelection::Update) => {
            sync.run_phase(Phase::Update, &mut state, now).await
        }
        Mode::Differential(PhaseSelection::Delete) => {
            sync.run_phase(Phase::Delete, &mut state, now).await
        }
    };

    save_state(pool, &state, now).await?;
    source_pool.close().await;

    let report = result.map_err(|e| match e {
        SyncError::Busy => anyhow!("{}. Run `sdx unlock` once no rebuild is running.", e),
        other => anyhow::Error::new(other),
    })?;
    Ok((report, state))
}

fn print_report(mode: Mode, report: &SyncReport, state: &SyncState) {
    println!("{}", mode.label());
    println!("  added: {}", report.added);
    println!("  updated: {}", report.updated);
    println!("  deleted: {}", report.deleted);
    println!("  skipped: {}", report.skipped.len());
    for reason in &report.skipped {
        println!("    {}", reason);
    }
    println!("  commits: {}", report.commits);
    println!("  addition cursor: {}", state.addition_cursor);
    println!("  update cursor: {}", state.update_cursor);
    println!("ok");
}
