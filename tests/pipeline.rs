//! Library-level tests: rebuild, differential sync and filtered search over
//! real SQLite files.

mod common;

use shadowdex::config::{load_config, Config};
use shadowdex::indexer::{sync_once, PhaseSelection};
use shadowdex::search::SearchSession;
use shadowdex::sqlite_catalog::SqliteCatalog;
use shadowdex::fts_engine::SqliteFtsEngine;
use shadowdex::{db, migrate, state};
use shadowdex_core::consistency;
use shadowdex_core::progress::NoProgress;
use shadowdex_core::search::QueryState;
use shadowdex_core::{SearchRequest, UserContext};

async fn indexed() -> (common::Fixture, Config) {
    let fx = common::setup().await;
    let config = load_config(&fx.config_path).unwrap();
    migrate::run_migrations(&config).await.unwrap();
    let (report, state) = sync_once(&config, None, &NoProgress).await.unwrap();
    assert_eq!(report.added, 5);
    assert!(report.skipped.is_empty());
    assert!(!state.busy);
    assert!(state.addition_cursor > 0);
    (fx, config)
}

fn titles(page: &shadowdex_core::SearchPage) -> Vec<String> {
    let mut t: Vec<String> = page.rows.iter().map(|r| r.title.clone()).collect();
    t.sort();
    t
}

#[tokio::test]
async fn sync_requires_init() {
    let fx = common::setup().await;
    let config = load_config(&fx.config_path).unwrap();
    let err = sync_once(&config, None, &NoProgress).await.unwrap_err();
    assert!(err.to_string().contains("sdx init"), "{}", err);
}

#[tokio::test]
async fn rebuild_then_search_filters_by_user() {
    let (_fx, config) = indexed().await;

    let mut member = SearchSession::open(&config, UserContext::user(7)).await.unwrap();
    let page = member.search(&SearchRequest::new("welcome")).await;
    assert_eq!(page.state, QueryState::Paginated);
    assert_eq!(page.hits, 5);
    assert_eq!(page.denied, 2);
    assert_eq!(page.total, 3);
    assert_eq!(titles(&page), vec!["Lab safety", "Re: Welcome", "Welcome to chemistry"]);

    let mut guest = SearchSession::open(&config, UserContext::guest()).await.unwrap();
    let page = guest.search(&SearchRequest::new("welcome")).await;
    assert_eq!(titles(&page), vec!["Lab safety"]);

    let mut admin = SearchSession::open(&config, UserContext::admin(2)).await.unwrap();
    let page = admin.search(&SearchRequest::new("welcome")).await;
    assert_eq!(page.total, 5);
    assert_eq!(page.denied, 0);
}

#[tokio::test]
async fn paging_numbers_visible_rows_and_reuses_cached_hits() {
    let (_fx, config) = indexed().await;
    let mut session = SearchSession::open(&config, UserContext::user(7)).await.unwrap();

    let first = session.search(&SearchRequest::new("welcome").page(1, 2)).await;
    assert!(!first.cached);
    assert_eq!(first.rows.len(), 2);
    assert_eq!(first.rows[0].number, 1);
    assert_eq!(session.cached_term(), Some("welcome"));

    let second = session.search(&SearchRequest::new("welcome").page(2, 2)).await;
    assert!(second.cached);
    assert_eq!(second.rows.len(), 1);
    assert_eq!(second.rows[0].number, 3);
    assert_eq!(second.total_pages(), 2);

    let other = session.search(&SearchRequest::new("goggles")).await;
    assert!(!other.cached);
    assert_eq!(session.cached_term(), Some("goggles"));
}

#[tokio::test]
async fn advanced_clauses_narrow_the_query() {
    let (_fx, config) = indexed().await;
    let mut admin = SearchSession::open(&config, UserContext::admin(2)).await.unwrap();

    let req = SearchRequest::new("welcome").advanced(shadowdex_core::query::AdvancedQuery {
        doc_type: Some("wiki".into()),
        not_appear: vec!["coffee".into()],
        ..Default::default()
    });
    let page = admin.search(&req).await;
    assert_eq!(titles(&page), vec!["Lab safety"]);

    let page = admin.search(&SearchRequest::new("author:ada")).await;
    assert_eq!(titles(&page), vec!["Welcome to chemistry"]);

    let page = admin.search(&SearchRequest::new("-welcome")).await;
    assert_eq!(page.state, QueryState::Invalid);
}

#[tokio::test]
async fn differential_sync_applies_adds_updates_and_deletes() {
    let (fx, config) = indexed().await;
    let later = chrono::Utc::now().timestamp() + 3600;

    common::exec(
        &fx.source_path,
        &format!(
            "INSERT INTO forum_posts VALUES (4, 'Welcome back', 'term starts monday', 'Ada', 2, 7, 1, 0, {0}, {0})",
            later
        ),
    )
    .await;
    common::exec(
        &fx.source_path,
        &format!("UPDATE wiki_pages SET title = 'Lab safety rules', modified = {} WHERE id = 1", later),
    )
    .await;
    common::exec(&fx.source_path, "DELETE FROM forum_posts WHERE id = 2").await;

    let (report, _) = sync_once(&config, Some(PhaseSelection::All), &NoProgress)
        .await
        .unwrap();
    assert_eq!((report.added, report.updated, report.deleted), (1, 1, 1));

    let mut admin = SearchSession::open(&config, UserContext::admin(2)).await.unwrap();
    let page = admin.search(&SearchRequest::new("welcome")).await;
    assert_eq!(page.total, 5);
    let got = titles(&page);
    assert!(got.contains(&"Welcome back".to_string()));
    assert!(got.contains(&"Lab safety rules".to_string()));
    assert!(!got.contains(&"Re: Welcome".to_string()));

    let pool = db::connect(&config).await.unwrap();
    let engine = SqliteFtsEngine::new(pool.clone());
    let catalog = SqliteCatalog::new(pool.clone());
    let check = consistency::check(&engine, &catalog).await.unwrap();
    assert!(check.is_consistent(), "{:?}", check);
    assert_eq!(check.engine_entries, 5);

    // Nothing new: a second add phase finds nothing to do.
    let (again, _) = sync_once(&config, Some(PhaseSelection::Add), &NoProgress)
        .await
        .unwrap();
    assert_eq!(again.added, 0);
}

#[tokio::test]
async fn sync_refuses_while_locked() {
    let (_fx, config) = indexed().await;
    let pool = db::connect(&config).await.unwrap();
    let now = chrono::Utc::now().timestamp();
    let lock = state::acquire_lock(&pool, 3600, now).await.unwrap().unwrap();

    let err = sync_once(&config, Some(PhaseSelection::All), &NoProgress)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Another sync is running"), "{}", err);

    state::release_lock(&pool, lock).await.unwrap();
    assert!(sync_once(&config, Some(PhaseSelection::All), &NoProgress).await.is_ok());
}

#[tokio::test]
async fn unbuilt_index_reports_not_ready() {
    let fx = common::setup().await;
    let config = load_config(&fx.config_path).unwrap();
    let mut session = SearchSession::open(&config, UserContext::user(7)).await.unwrap();
    let page = session.search(&SearchRequest::new("welcome")).await;
    assert_eq!(page.state, QueryState::EngineUnavailable);
    assert!(page.notice.is_some());
}
