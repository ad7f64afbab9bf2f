//! Persisted sync state and the writer lock.
//!
//! `sync_state` holds the two watermarks and the busy flag. `sync_lock`
//! holds at most one row: whoever inserts it owns the index until they
//! delete it again. A lock older than `sync.lock_timeout_secs` is assumed
//! to belong to a dead process and is taken over.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use shadowdex_core::SyncState;

pub async fn load_state(pool: &SqlitePool) -> Result<SyncState> {
    let row = sqlx::query("SELECT addition_cursor, update_cursor, busy FROM sync_state WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(match row {
        Some(r) => SyncState {
            addition_cursor: r.get("addition_cursor"),
            update_cursor: r.get("update_cursor"),
            busy: r.get::<i64, _>("busy") != 0,
        },
        None => SyncState::default(),
    })
}

pub async fn save_state(pool: &SqlitePool, state: &SyncState, now: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (id, addition_cursor, update_cursor, busy, updated_at)
        VALUES (1, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            addition_cursor = excluded.addition_cursor,
            update_cursor = excluded.update_cursor,
            busy = excluded.busy,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(state.addition_cursor)
    .bind(state.update_cursor)
    .bind(state.busy as i64)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Proof of holding the writer lock.
#[derive(Debug)]
pub struct SyncLock {
    holder: String,
}

impl SyncLock {
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

/// Try to take the writer lock. `None` if someone else holds a fresh one.
pub async fn acquire_lock(pool: &SqlitePool, timeout_secs: i64, now: i64) -> Result<Option<SyncLock>> {
    let stale = sqlx::query("DELETE FROM sync_lock WHERE acquired_at < ?")
        .bind(now - timeout_secs)
        .execute(pool)
        .await?
        .rows_affected();
    if stale > 0 {
        warn!("took over a stale sync lock older than {}s", timeout_secs);
    }

    let holder = Uuid::new_v4().to_string();
    let acquired = sqlx::query(
        "INSERT INTO sync_lock (id, holder, acquired_at) VALUES (1, ?, ?) ON CONFLICT(id) DO NOTHING",
    )
    .bind(&holder)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();

    Ok((acquired == 1).then_some(SyncLock { holder }))
}

pub async fn release_lock(pool: &SqlitePool, lock: SyncLock) -> Result<()> {
    sqlx::query("DELETE FROM sync_lock WHERE holder = ?")
        .bind(&lock.holder)
        .execute(pool)
        .await?;
    Ok(())
}

/// Current lock holder and acquisition time, if any.
pub async fn lock_info(pool: &SqlitePool) -> Result<Option<(String, i64)>> {
    let row = sqlx::query("SELECT holder, acquired_at FROM sync_lock WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| (r.get("holder"), r.get("acquired_at"))))
}

/// Clear the busy flag and drop any lock.
pub async fn force_unlock(pool: &SqlitePool, now: i64) -> Result<()> {
    let mut state = load_state(pool).await?;
    state.busy = false;
    save_state(pool, &state, now).await?;
    sqlx::query("DELETE FROM sync_lock").execute(pool).await?;
    Ok(())
}
