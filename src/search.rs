//! `sdx search`: access-filtered, paginated search over the index.
//!
//! A [`SearchSession`] belongs to one user. It owns the engine handle,
//! the adapter registry used for capability checks, the course gate and
//! the single-slot result cache, so repeated queries for the same term
//! (for example paging through results) skip the engine.

use anyhow::Result;

use shadowdex_core::access::CapabilityPolicy;
use shadowdex_core::paging;
use shadowdex_core::{
    AccessGuard, AdapterRegistry, ResultCache, SearchPage, SearchRequest, UserContext,
};

use crate::config::Config;
use crate::course_access::SqlCourseAccess;
use crate::db;
use crate::fts_engine::SqliteFtsEngine;
use crate::table_adapter::build_registry;

pub struct SearchSession {
    engine: SqliteFtsEngine,
    registry: AdapterRegistry,
    courses: SqlCourseAccess,
    policy: CapabilityPolicy,
    user: UserContext,
    cache: ResultCache,
}

impl SearchSession {
    pub async fn open(config: &Config, user: UserContext) -> Result<Self> {
        let index = db::connect(config).await?;
        let source = db::connect_source(config).await?;
        Ok(Self {
            engine: SqliteFtsEngine::new(index),
            registry: build_registry(config, &source),
            courses: SqlCourseAccess::new(source, &config.access),
            policy: config.access.policy(),
            user,
            cache: ResultCache::new(),
        })
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    /// Term whose hits are currently cached.
    pub fn cached_term(&self) -> Option<&str> {
        self.cache.term()
    }

    pub async fn search(&mut self, req: &SearchRequest) -> SearchPage {
        let guard = AccessGuard::new(&self.registry, &self.courses).with_policy(self.policy);
        shadowdex_core::search(&self.engine, &guard, &self.user, req, Some(&mut self.cache)).await
    }
}

/// Run a search and print the page.
pub async fn run_search(config: &Config, user: UserContext, req: SearchRequest) -> Result<()> {
    let mut session = SearchSession::open(config, user).await?;
    let page = session.search(&req).await;

    if let Some(notice) = &page.notice {
        println!("{}", notice);
        return Ok(());
    }
    if page.rows.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for row in &page.rows {
        let date = chrono::DateTime::from_timestamp(row.date, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let title = if row.title.is_empty() {
            "(untitled)"
        } else {
            row.title.as_str()
        };

        println!(
            "{}. [{:.2}] {}/{} / {}",
            row.number, row.score, row.doc_type, row.item_type, title
        );
        if !row.author.is_empty() {
            println!("    author: {}", row.author);
        }
        println!("    modified: {}", date);
        println!("    url: {}", row.url);
        println!("    id: {}", row.doc_id);
        println!();
    }

    let first = page.rows.first().map(|r| r.number).unwrap_or(0);
    let last = page.rows.last().map(|r| r.number).unwrap_or(0);
    println!(
        "Showing {}-{} of {}{} results (page {} of {})",
        first,
        last,
        if page.is_exact() { "" } else { "~" },
        page.total,
        page.page,
        page.total_pages()
    );
    if page.total_pages() > 1 {
        println!(
            "{}",
            paging::render(&page.page_links(config.search.page_window))
        );
    }
    Ok(())
}
