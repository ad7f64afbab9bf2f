//! Live-id queries against the system-of-record.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use shadowdex_core::source::{SourceStore, TimeBound};
use shadowdex_core::SyncDescriptor;

use crate::config::is_identifier;

pub struct SqliteSourceStore {
    pool: SqlitePool,
}

impl SqliteSourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceStore for SqliteSourceStore {
    async fn live_ids(&self, desc: &SyncDescriptor, bound: TimeBound) -> Result<Vec<String>> {
        select_ids(&self.pool, desc, bound).await
    }
}

/// `table.column` unless the column is already qualified.
pub(crate) fn qualify(table: &str, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", table, column)
    }
}

/// Render the id query for a descriptor. The time value, if any, is the
/// only bind parameter.
pub fn render_id_query(desc: &SyncDescriptor, bound: TimeBound) -> Result<(String, Option<i64>)> {
    for ident in [
        &desc.source_table,
        &desc.id_column,
        &desc.created_field,
        &desc.modified_field,
    ] {
        if !is_identifier(ident) {
            bail!("invalid identifier in sync descriptor: '{}'", ident);
        }
    }

    let table = &desc.source_table;
    let mut sql = format!(
        "SELECT CAST({} AS TEXT) FROM {}",
        qualify(table, &desc.id_column),
        table
    );
    if let Some(join) = &desc.extra_join {
        sql.push(' ');
        sql.push_str(join);
    }

    let mut conditions = Vec::new();
    let value = match bound {
        TimeBound::CreatedAfter(t) => {
            conditions.push(format!("{} > ?", qualify(table, &desc.created_field)));
            Some(t)
        }
        TimeBound::ModifiedAfter(t) => {
            conditions.push(format!("{} > ?", qualify(table, &desc.modified_field)));
            Some(t)
        }
        TimeBound::Unbounded => None,
    };
    if let Some(w) = &desc.extra_where {
        conditions.push(format!("({})", w));
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(&format!(" ORDER BY {}", qualify(table, &desc.id_column)));

    Ok((sql, value))
}

pub(crate) async fn select_ids(
    pool: &SqlitePool,
    desc: &SyncDescriptor,
    bound: TimeBound,
) -> Result<Vec<String>> {
    let (sql, value) = render_id_query(desc, bound)?;
    let mut q = sqlx::query_scalar::<_, String>(&sql);
    if let Some(t) = value {
        q = q.bind(t);
    }
    Ok(q.fetch_all(pool).await?)
}
