//! Table-backed source adapters configured in TOML.
//!
//! Each `[adapters.<name>]` section maps one source table (optionally
//! joined) to documents of doctype `<name>`. Several item types can share
//! the table, told apart by their `where` clause.
//!
//! The capability predicate is deliberately simple: the row's owner may
//! always see it; otherwise `visible_column`, when configured, decides.
//! Without either column the adapter has no predicate and the configured
//! capability policy applies.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use shadowdex_core::adapter::{Access, AccessRequest, AdapterRegistry, SourceAdapter};
use shadowdex_core::source::TimeBound;
use shadowdex_core::{Document, SourceInstance, SyncDescriptor, UserContext};

use crate::config::{AdapterConfig, Config};
use crate::sqlite_source::{qualify, select_ids};

pub struct TableAdapter {
    name: String,
    path: String,
    config: AdapterConfig,
    descriptors: Vec<SyncDescriptor>,
    pool: SqlitePool,
}

impl TableAdapter {
    pub fn new(name: &str, config: AdapterConfig, pool: SqlitePool) -> Self {
        let descriptors = config
            .item_types(name)
            .into_iter()
            .map(|item| {
                let mut desc = SyncDescriptor::new(
                    &config.id_column,
                    &config.table,
                    &config.created_column,
                    &config.modified_column,
                    &item.item_type,
                );
                if let Some(w) = item.where_clause {
                    desc = desc.with_where(w);
                }
                if let Some(j) = &config.join {
                    desc = desc.with_join(j.clone());
                }
                desc
            })
            .collect();
        Self {
            name: name.to_string(),
            path: config.path.clone().unwrap_or_else(|| name.to_string()),
            config,
            descriptors,
            pool,
        }
    }

    fn col(&self, column: &str) -> String {
        qualify(&self.config.table, column)
    }

    fn int_col(&self, column: &Option<String>, alias: &str) -> String {
        match column {
            Some(c) => format!("COALESCE({}, 0) AS {}", self.col(c), alias),
            None => format!("0 AS {}", alias),
        }
    }

    fn select_document(&self, desc: &SyncDescriptor) -> String {
        let cfg = &self.config;
        let author = match &cfg.author_column {
            Some(c) => format!("COALESCE(CAST({} AS TEXT), '') AS author", self.col(c)),
            None => "'' AS author".to_string(),
        };
        let mut sql = format!(
            "SELECT CAST({id} AS TEXT) AS doc_id, \
             COALESCE(CAST({title} AS TEXT), '') AS title, \
             COALESCE(CAST({content} AS TEXT), '') AS contents, \
             COALESCE({modified}, 0) AS modified, \
             {author}, {course}, {group}, {user}, {context} \
             FROM {table}",
            id = self.col(&cfg.id_column),
            title = self.col(&cfg.title_column),
            content = self.col(&cfg.content_column),
            modified = self.col(&cfg.modified_column),
            author = author,
            course = self.int_col(&cfg.course_column, "course_id"),
            group = self.int_col(&cfg.group_column, "group_id"),
            user = self.int_col(&cfg.user_column, "user_id"),
            context = self.int_col(&cfg.context_column, "context_id"),
            table = cfg.table,
        );
        if let Some(join) = &desc.extra_join {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&format!(" WHERE {} = ?", self.col(&cfg.id_column)));
        if let Some(w) = &desc.extra_where {
            sql.push_str(&format!(" AND ({})", w));
        }
        sql
    }

    fn document_from_row(&self, row: &SqliteRow, item_type: &str) -> Document {
        let doc_id: String = row.get("doc_id");
        Document {
            url: self.config.url.replace("{id}", &doc_id),
            doc_id,
            doc_type: self.name.clone(),
            item_type: item_type.to_string(),
            context_id: row.get("context_id"),
            course_id: row.get("course_id"),
            group_id: row.get("group_id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            author: row.get("author"),
            contents: row.get("contents"),
            date: row.get("modified"),
            path: self.path.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceAdapter for TableAdapter {
    fn doc_type(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn sync_descriptors(&self) -> Vec<SyncDescriptor> {
        self.descriptors.clone()
    }

    async fn iterate(&self) -> Result<Vec<SourceInstance>> {
        let mut instances = Vec::new();
        for desc in &self.descriptors {
            for id in select_ids(&self.pool, desc, TimeBound::Unbounded).await? {
                instances.push(SourceInstance {
                    id,
                    item_type: desc.item_type.clone(),
                    data: serde_json::Value::Null,
                });
            }
        }
        Ok(instances)
    }

    async fn extract_for_index(&self, instance: &SourceInstance) -> Result<Vec<Document>> {
        Ok(self
            .fetch_single(&instance.id, &instance.item_type)
            .await?
            .into_iter()
            .collect())
    }

    async fn fetch_single(&self, doc_id: &str, item_type: &str) -> Result<Option<Document>> {
        let Some(desc) = self.descriptors.iter().find(|d| d.item_type == item_type) else {
            return Ok(None);
        };
        let row = sqlx::query(&self.select_document(desc))
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| self.document_from_row(&r, item_type)))
    }

    async fn check_access(&self, user: &UserContext, req: &AccessRequest<'_>) -> Result<Access> {
        let cfg = &self.config;
        if cfg.user_column.is_none() && cfg.visible_column.is_none() {
            return Ok(Access::Unresolved);
        }

        let mut sql = format!(
            "SELECT {}, {} FROM {}",
            self.int_col(&cfg.user_column, "owner"),
            self.int_col(&cfg.visible_column, "visible"),
            cfg.table,
        );
        // Owner and visibility columns may come from the joined table.
        let join = self
            .descriptors
            .iter()
            .find(|d| d.item_type == req.item_type)
            .and_then(|d| d.extra_join.as_ref())
            .or(cfg.join.as_ref());
        if let Some(join) = join {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&format!(" WHERE {} = ?", self.col(&cfg.id_column)));
        let Some(row) = sqlx::query(&sql)
            .bind(req.doc_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            debug!(doc_type = %self.name, doc_id = req.doc_id, "source row is gone");
            return Ok(Access::Deny);
        };

        let owner: i64 = row.get("owner");
        if owner > 0 && owner == user.user_id && !user.is_guest {
            return Ok(Access::Allow);
        }
        if cfg.visible_column.is_some() {
            let visible: i64 = row.get("visible");
            return Ok(Access::from(visible != 0));
        }
        Ok(Access::Unresolved)
    }
}

/// One [`TableAdapter`] per configured adapter, with `sync.disabled` applied.
pub fn build_registry(config: &Config, source: &SqlitePool) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for (name, adapter) in &config.adapters {
        registry.register(Box::new(TableAdapter::new(
            name,
            adapter.clone(),
            source.clone(),
        )));
    }
    for name in &config.sync.disabled {
        registry.disable(name);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ItemConfig;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn source() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE forum_posts (
                id INTEGER PRIMARY KEY, subject TEXT, message TEXT, author_name TEXT,
                course INTEGER, userid INTEGER, approved INTEGER, parent INTEGER,
                created INTEGER, modified INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO forum_posts VALUES
                (1, 'Welcome', 'hello everyone', 'Ada', 2, 7, 1, 0, 100, 100),
                (2, 'Re: Welcome', 'hi', NULL, 2, 8, 0, 1, 110, 120)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn forum() -> AdapterConfig {
        AdapterConfig {
            table: "forum_posts".into(),
            id_column: "id".into(),
            title_column: "subject".into(),
            content_column: "message".into(),
            author_column: Some("author_name".into()),
            created_column: "created".into(),
            modified_column: "modified".into(),
            course_column: Some("course".into()),
            group_column: None,
            user_column: Some("userid".into()),
            context_column: None,
            visible_column: Some("approved".into()),
            url: "/forum/{id}".into(),
            path: Some("mod/forum".into()),
            description: "Forum posts".into(),
            join: None,
            items: vec![
                ItemConfig {
                    item_type: "head".into(),
                    where_clause: Some("parent = 0".into()),
                },
                ItemConfig {
                    item_type: "post".into(),
                    where_clause: Some("parent <> 0".into()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn iterate_and_extract_by_item_type() {
        let adapter = TableAdapter::new("forum", forum(), source().await);
        let instances = adapter.iterate().await.unwrap();
        let pairs: Vec<(&str, &str)> = instances
            .iter()
            .map(|i| (i.id.as_str(), i.item_type.as_str()))
            .collect();
        assert_eq!(pairs, vec![("1", "head"), ("2", "post")]);

        let docs = adapter.extract_for_index(&instances[1]).await.unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.title, "Re: Welcome");
        assert_eq!(doc.author, "");
        assert_eq!(doc.url, "/forum/2");
        assert_eq!(doc.path, "mod/forum");
        assert_eq!(doc.date, 120);
        assert_eq!(doc.course_id, 2);
        assert_eq!(doc.user_id, 8);
    }

    #[tokio::test]
    async fn fetch_single_respects_the_item_filter() {
        let adapter = TableAdapter::new("forum", forum(), source().await);
        assert!(adapter.fetch_single("1", "head").await.unwrap().is_some());
        assert!(adapter.fetch_single("1", "post").await.unwrap().is_none());
        assert!(adapter.fetch_single("1", "unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn owner_and_visibility_decide_access() {
        let adapter = TableAdapter::new("forum", forum(), source().await);
        let req = |id| AccessRequest {
            path: "mod/forum",
            item_type: "post",
            doc_id: id,
            group_id: 0,
            context_id: 0,
        };
        let stranger = UserContext::user(3);
        assert_eq!(adapter.check_access(&stranger, &req("1")).await.unwrap(), Access::Allow);
        assert_eq!(adapter.check_access(&stranger, &req("2")).await.unwrap(), Access::Deny);
        assert_eq!(
            adapter.check_access(&UserContext::user(8), &req("2")).await.unwrap(),
            Access::Allow
        );
        assert_eq!(adapter.check_access(&stranger, &req("99")).await.unwrap(), Access::Deny);
    }

    #[tokio::test]
    async fn visibility_from_a_joined_table() {
        let pool = source().await;
        sqlx::query("CREATE TABLE discussions (id INTEGER PRIMARY KEY, approved INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO discussions VALUES (1, 1), (2, 0)")
            .execute(&pool)
            .await
            .unwrap();

        let mut cfg = forum();
        cfg.join = Some("JOIN discussions d ON d.id = forum_posts.id".into());
        cfg.visible_column = Some("d.approved".into());
        let adapter = TableAdapter::new("forum", cfg, pool);
        assert!(adapter.fetch_single("2", "post").await.unwrap().is_some());

        let req = |id| AccessRequest {
            path: "mod/forum",
            item_type: "post",
            doc_id: id,
            group_id: 0,
            context_id: 0,
        };
        let stranger = UserContext::user(3);
        assert_eq!(adapter.check_access(&stranger, &req("1")).await.unwrap(), Access::Allow);
        assert_eq!(adapter.check_access(&stranger, &req("2")).await.unwrap(), Access::Deny);
    }

    #[tokio::test]
    async fn no_owner_or_visibility_column_is_unresolved() {
        let mut cfg = forum();
        cfg.user_column = None;
        cfg.visible_column = None;
        let adapter = TableAdapter::new("forum", cfg, source().await);
        let req = AccessRequest {
            path: "mod/forum",
            item_type: "post",
            doc_id: "1",
            group_id: 0,
            context_id: 0,
        };
        assert_eq!(
            adapter.check_access(&UserContext::user(3), &req).await.unwrap(),
            Access::Unresolved
        );
    }
}
