//! Access-filtered query execution.
//!
//! A query moves through
//! `Empty → Parsed → (EngineUnavailable | Executed) → Filtered → Paginated`.
//! Parse failures and an unavailable engine never surface as errors: the
//! returned [`SearchPage`] carries the state and a user-facing notice.
//!
//! # Filtering
//!
//! Whether a hit is visible is only known once it has been checked, so the
//! hits are scanned in relevance order keeping a running count of visible
//! ones. A hit lands on page `p` of size `k` if that count is within
//! `[(p-1)k, pk)` when it passes. The scan stops at `pk` visible hits
//! unless `full_scan` is set.
//!
//! The reported total is the number of hits not denied so far: hits past
//! the point where the scan stopped are assumed visible. With `full_scan`
//! the total is exact.

use serde::Serialize;
use tracing::{debug, warn};

use crate::access::AccessGuard;
use crate::cache::ResultCache;
use crate::error::ParseError;
use crate::index::{EngineHit, FullTextEngine};
use crate::models::UserContext;
use crate::paging::{PageLink, Paginator};
use crate::query::{parse, AdvancedQuery};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_MAX_HITS: usize = 1000;

/// Shown when the index is missing or cannot be read.
pub const NOT_READY_NOTICE: &str = "The search index has not been built yet.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Empty,
    Parsed,
    Invalid,
    EngineUnavailable,
    Executed,
    Filtered,
    Paginated,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub advanced: AdvancedQuery,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    /// Check every hit so the total is exact.
    pub full_scan: bool,
    /// Upper bound on hits requested from the engine.
    pub max_hits: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            advanced: AdvancedQuery::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            full_scan: false,
            max_hits: DEFAULT_MAX_HITS,
        }
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }

    pub fn advanced(mut self, advanced: AdvancedQuery) -> Self {
        self.advanced = advanced;
        self
    }

    pub fn full_scan(mut self, full_scan: bool) -> Self {
        self.full_scan = full_scan;
        self
    }

    pub fn max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits.max(1);
        self
    }
}

/// One visible result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// 1-based position in the engine's hit list.
    pub rank: usize,
    /// 1-based position among visible hits.
    pub number: usize,
    pub url: String,
    pub title: String,
    pub score: f64,
    pub doc_type: String,
    pub item_type: String,
    pub doc_id: String,
    pub author: String,
    pub course_id: i64,
    pub user_id: i64,
    pub date: i64,
}

impl ResultRow {
    fn from_hit(hit: &EngineHit, rank: usize, number: usize) -> Self {
        Self {
            rank,
            number,
            url: hit.url.clone(),
            title: hit.title.clone(),
            score: hit.score,
            doc_type: hit.doc_type.clone(),
            item_type: hit.item_type.clone(),
            doc_id: hit.doc_id.clone(),
            author: hit.author.clone(),
            course_id: hit.course_id,
            user_id: hit.user_id,
            date: hit.date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub state: QueryState,
    /// Rendered engine query, empty unless the query parsed.
    pub query: String,
    pub notice: Option<String>,
    pub rows: Vec<ResultRow>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    /// Hits returned by the engine.
    pub hits: usize,
    /// Hits checked against the access filter.
    pub scanned: usize,
    pub denied: usize,
    /// Served from the result cache.
    pub cached: bool,
}

impl SearchPage {
    fn empty(state: QueryState, req: &SearchRequest, notice: Option<String>) -> Self {
        Self {
            state,
            query: String::new(),
            notice,
            rows: Vec::new(),
            total: 0,
            page: req.page.max(1),
            page_size: req.page_size.max(1),
            hits: 0,
            scanned: 0,
            denied: 0,
            cached: false,
        }
    }

    pub fn count(&self) -> usize {
        self.total
    }

    pub fn total_pages(&self) -> usize {
        self.paginator().total_pages()
    }

    /// Whether `total` was computed from a scan of every hit.
    pub fn is_exact(&self) -> bool {
        self.scanned == self.hits
    }

    pub fn page_links(&self, window: usize) -> Vec<PageLink> {
        self.paginator().with_window(window).links()
    }

    fn paginator(&self) -> Paginator {
        Paginator::new(self.total, self.page, self.page_size)
    }
}

/// Parse, execute, filter and paginate one query for `user`.
///
/// `cache` holds the engine hits for the last query term; it is neither
/// read nor written for queries that fail to parse or find the engine
/// unavailable.
pub async fn search<E>(
    engine: &E,
    guard: &AccessGuard<'_>,
    user: &UserContext,
    req: &SearchRequest,
    cache: Option<&mut ResultCache>,
) -> SearchPage
where
    E: FullTextEngine + ?Sized,
{
    let parsed = match parse(&req.query, &req.advanced) {
        Ok(parsed) => parsed,
        Err(ParseError::Empty) => return SearchPage::empty(QueryState::Empty, req, None),
        Err(e) => {
            debug!(query = %req.query, "rejected query: {}", e);
            return SearchPage::empty(QueryState::Invalid, req, Some(e.to_string()));
        }
    };
    let term = parsed.to_query_string();
    debug!(state = ?QueryState::Parsed, query = %term);

    if !engine.is_available().await {
        return SearchPage::empty(
            QueryState::EngineUnavailable,
            req,
            Some(NOT_READY_NOTICE.to_string()),
        );
    }

    let limit = req.max_hits.max(1);
    let cached = cache
        .as_deref()
        .and_then(|c| c.get(&term, limit))
        .map(<[EngineHit]>::to_vec);
    let from_cache = cached.is_some();
    let hits = match cached {
        Some(hits) => hits,
        None => match engine.find(&parsed, limit).await {
            Ok(hits) => {
                if let Some(c) = cache {
                    c.put(term.clone(), limit, hits.clone());
                }
                hits
            }
            Err(e) => {
                warn!(query = %term, "search failed: {:#}", e);
                return SearchPage::empty(
                    QueryState::EngineUnavailable,
                    req,
                    Some(NOT_READY_NOTICE.to_string()),
                );
            }
        },
    };
    debug!(state = ?QueryState::Executed, hits = hits.len(), cached = from_cache);

    let page = req.page.max(1);
    let page_size = req.page_size.max(1);
    let start = (page - 1) * page_size;
    let end = page * page_size;

    let mut rows = Vec::new();
    let mut visible = 0;
    let mut scanned = 0;
    let mut denied = 0;
    for (i, hit) in hits.iter().enumerate() {
        if !req.full_scan && visible >= end {
            break;
        }
        scanned += 1;
        if !guard.permits(user, hit).await {
            denied += 1;
            continue;
        }
        if visible >= start && visible < end {
            rows.push(ResultRow::from_hit(hit, i + 1, visible + 1));
        }
        visible += 1;
    }
    debug!(state = ?QueryState::Filtered, scanned, denied);

    SearchPage {
        state: QueryState::Paginated,
        query: term,
        notice: None,
        rows,
        total: hits.len() - denied,
        page,
        page_size,
        hits: hits.len(),
        scanned,
        denied,
        cached: from_cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{CapabilityPolicy, OpenCourses};
    use crate::adapter::AdapterRegistry;
    use crate::index::memory::InMemoryEngine;
    use crate::models::Document;
    use crate::source::memory::{InMemoryAdapter, InMemorySource};
    use std::sync::Arc;

    /// Ten hits whose scores give ranks 1..=10 for the query "rust".
    async fn ranked_engine() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        for rank in 1..=10 {
            let doc = Document {
                doc_id: rank.to_string(),
                doc_type: "wiki".into(),
                item_type: "page".into(),
                title: format!("Page {}", rank),
                contents: "rust ".repeat(11 - rank),
                url: format!("/wiki/{}", rank),
                path: "wiki".into(),
                ..Default::default()
            };
            engine.add(&doc).await.unwrap();
        }
        engine.commit().await.unwrap();
        engine
    }

    fn registry(denied: &[&str]) -> AdapterRegistry {
        let source = Arc::new(InMemorySource::new());
        let wiki = InMemoryAdapter::new("wiki", source, &[("page", None)]);
        for id in denied {
            wiki.deny(id);
        }
        let mut reg = AdapterRegistry::new();
        reg.register(Box::new(wiki));
        reg
    }

    fn ranks(page: &SearchPage) -> Vec<usize> {
        page.rows.iter().map(|r| r.rank).collect()
    }

    #[tokio::test]
    async fn denied_hits_are_skipped_in_relevance_order() {
        let engine = ranked_engine().await;
        let reg = registry(&["2", "5", "8"]);
        let guard = AccessGuard::new(&reg, &OpenCourses);
        let user = UserContext::user(3);

        let page = search(&engine, &guard, &user, &SearchRequest::new("rust").page(1, 3), None).await;
        assert_eq!(page.state, QueryState::Paginated);
        assert_eq!(ranks(&page), vec![1, 3, 4]);
        assert_eq!(page.scanned, 4);
        assert_eq!(page.count(), 9);
        assert!(!page.is_exact());

        let req = SearchRequest::new("rust").page(1, 3).full_scan(true);
        let page = search(&engine, &guard, &user, &req, None).await;
        assert_eq!(ranks(&page), vec![1, 3, 4]);
        assert_eq!(page.count(), 7);
        assert_eq!(page.total_pages(), 3);
        assert!(page.is_exact());
    }

    #[tokio::test]
    async fn last_page_holds_the_remainder() {
        let engine = ranked_engine().await;
        let reg = registry(&["2", "5", "8"]);
        let guard = AccessGuard::new(&reg, &OpenCourses);
        let user = UserContext::user(3);

        let req = SearchRequest::new("rust").page(3, 3).full_scan(true);
        let page = search(&engine, &guard, &user, &req, None).await;
        assert_eq!(ranks(&page), vec![10]);
        assert_eq!(page.rows[0].number, 7);

        let req = SearchRequest::new("rust").page(2, 3);
        let page = search(&engine, &guard, &user, &req, None).await;
        assert_eq!(ranks(&page), vec![6, 7, 9]);
    }

    #[tokio::test]
    async fn administrators_bypass_filtering() {
        let engine = ranked_engine().await;
        let reg = registry(&["2", "5", "8"]);
        let guard = AccessGuard::new(&reg, &OpenCourses);

        let req = SearchRequest::new("rust").page(1, 3);
        let page = search(&engine, &guard, &UserContext::admin(2), &req, None).await;
        assert_eq!(ranks(&page), vec![1, 2, 3]);
        assert_eq!(page.count(), 10);
    }

    #[tokio::test]
    async fn unknown_doc_types_follow_the_policy() {
        let engine = ranked_engine().await;
        let reg = AdapterRegistry::new();
        let user = UserContext::user(3);
        let req = SearchRequest::new("rust").page(1, 3);

        let open = AccessGuard::new(&reg, &OpenCourses);
        assert_eq!(search(&engine, &open, &user, &req, None).await.rows.len(), 3);

        let closed = AccessGuard::new(&reg, &OpenCourses).with_policy(CapabilityPolicy::FailClosed);
        let page = search(&engine, &closed, &user, &req.clone().full_scan(true), None).await;
        assert!(page.rows.is_empty());
        assert_eq!(page.count(), 0);
    }

    #[tokio::test]
    async fn unavailable_engine_reports_not_ready() {
        let engine = ranked_engine().await;
        engine.set_available(false);
        let reg = registry(&[]);
        let guard = AccessGuard::new(&reg, &OpenCourses);
        let mut cache = ResultCache::new();

        let page = search(
            &engine,
            &guard,
            &UserContext::user(3),
            &SearchRequest::new("rust"),
            Some(&mut cache),
        )
        .await;
        assert_eq!(page.state, QueryState::EngineUnavailable);
        assert_eq!(page.count(), 0);
        assert_eq!(page.notice.as_deref(), Some(NOT_READY_NOTICE));
        assert!(cache.term().is_none());
    }

    #[tokio::test]
    async fn bad_queries_do_not_raise() {
        let engine = ranked_engine().await;
        let reg = registry(&[]);
        let guard = AccessGuard::new(&reg, &OpenCourses);
        let user = UserContext::user(3);
        let mut cache = ResultCache::new();

        let page = search(&engine, &guard, &user, &SearchRequest::new("**"), Some(&mut cache)).await;
        assert_eq!(page.state, QueryState::Invalid);
        assert!(page.notice.is_some());

        let page = search(&engine, &guard, &user, &SearchRequest::new(""), Some(&mut cache)).await;
        assert_eq!(page.state, QueryState::Empty);
        assert!(cache.term().is_none());
    }

    #[tokio::test]
    async fn cached_hits_are_still_filtered() {
        let engine = ranked_engine().await;
        let open = registry(&[]);
        let strict = registry(&["1"]);
        let user = UserContext::user(3);
        let req = SearchRequest::new("rust").page(1, 3);
        let mut cache = ResultCache::new();

        let guard = AccessGuard::new(&open, &OpenCourses);
        let first = search(&engine, &guard, &user, &req, Some(&mut cache)).await;
        assert!(!first.cached);
        assert_eq!(cache.term(), Some("rust"));

        let guard = AccessGuard::new(&strict, &OpenCourses);
        let second = search(&engine, &guard, &user, &req, Some(&mut cache)).await;
        assert!(second.cached);
        assert_eq!(ranks(&second), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn cache_is_refetched_for_a_larger_hit_limit() {
        let engine = ranked_engine().await;
        let reg = registry(&[]);
        let guard = AccessGuard::new(&reg, &OpenCourses);
        let admin = UserContext::admin(2);
        let mut cache = ResultCache::new();

        let req = SearchRequest::new("rust").max_hits(2);
        let small = search(&engine, &guard, &admin, &req, Some(&mut cache)).await;
        assert_eq!(small.count(), 2);

        let req = SearchRequest::new("rust").max_hits(10);
        let full = search(&engine, &guard, &admin, &req, Some(&mut cache)).await;
        assert!(!full.cached);
        assert_eq!(full.count(), 10);

        let req = SearchRequest::new("rust").max_hits(5);
        let cut = search(&engine, &guard, &admin, &req, Some(&mut cache)).await;
        assert!(cut.cached);
        assert_eq!(cut.count(), 5);
    }
}
