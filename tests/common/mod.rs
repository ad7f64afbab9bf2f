//! Shared fixture: a source database with two adapters' worth of rows and a
//! config pointing at it.

#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

/// Source rows are stamped well in the past; rows that should be picked up
/// by a differential run are stamped one hour after the run.
pub const PAST: i64 = 1_000;

pub struct Fixture {
    pub tmp: TempDir,
    pub config_path: PathBuf,
    pub source_path: PathBuf,
}

impl Fixture {
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE forum_posts (
        id INTEGER PRIMARY KEY, subject TEXT, message TEXT, author_name TEXT,
        course INTEGER, userid INTEGER, approved INTEGER, parent INTEGER,
        created INTEGER, modified INTEGER)"#,
    r#"CREATE TABLE wiki_pages (
        id INTEGER PRIMARY KEY, title TEXT, body TEXT, course INTEGER,
        created INTEGER, modified INTEGER)"#,
    "CREATE TABLE courses (id INTEGER PRIMARY KEY, visible INTEGER, guest_access INTEGER)",
    "CREATE TABLE enrolments (user_id INTEGER, course_id INTEGER)",
    // course 2: enrolled users only, 3: open to guests, 4: enrolled users only
    "INSERT INTO courses VALUES (2, 1, 0), (3, 1, 1), (4, 1, 0)",
    "INSERT INTO enrolments VALUES (7, 2)",
];

/// Five documents mention "welcome". User 7 may see forum 1 (own post),
/// forum 2 (approved) and wiki 1 (guest course). Forum 3 is unapproved
/// and wiki 2 is in a course user 7 is not enrolled in.
const ROWS: &[&str] = &[
    "INSERT INTO forum_posts VALUES (1, 'Welcome to chemistry', 'hello everyone and welcome', 'Ada', 2, 7, 1, 0, 1000, 1000)",
    "INSERT INTO forum_posts VALUES (2, 'Re: Welcome', 'thanks for the welcome', 'Bob', 2, 8, 1, 1, 1000, 1000)",
    "INSERT INTO forum_posts VALUES (3, 'Draft', 'welcome draft awaiting approval', 'Cy', 2, 9, 0, 1, 1000, 1000)",
    "INSERT INTO wiki_pages VALUES (1, 'Lab safety', 'welcome to the lab, wear goggles', 3, 1000, 1000)",
    "INSERT INTO wiki_pages VALUES (2, 'Staff room', 'welcome staff, coffee is free', 4, 1000, 1000)",
];

pub async fn open_source(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap()
}

pub async fn exec(path: &Path, sql: &str) {
    let pool = open_source(path).await;
    sqlx::query(sql).execute(&pool).await.unwrap();
    pool.close().await;
}

pub async fn setup() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let source_path = root.join("data").join("content.sqlite");
    let pool = open_source(&source_path).await;
    for sql in SCHEMA.iter().chain(ROWS) {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let config = format!(
        r#"[db]
path = "{root}/data/index.sqlite"

[source]
path = "{root}/data/content.sqlite"

[sync]
commit_every = 2

[search]
page_size = 2

[access]
courses_table = "courses"
enrolments_table = "enrolments"

[adapters.forum]
table = "forum_posts"
title_column = "subject"
content_column = "message"
author_column = "author_name"
course_column = "course"
user_column = "userid"
visible_column = "approved"
url = "/mod/forum/discuss.php?d={{id}}"
path = "mod/forum"

[[adapters.forum.items]]
item_type = "head"
where = "parent = 0"

[[adapters.forum.items]]
item_type = "post"
where = "parent <> 0"

[adapters.wiki]
table = "wiki_pages"
title_column = "title"
content_column = "body"
course_column = "course"
url = "/mod/wiki/view.php?pageid={{id}}"
path = "mod/wiki"
"#,
        root = root.display()
    );
    let config_path = root.join("config").join("sdx.toml");
    fs::write(&config_path, config).unwrap();

    Fixture {
        tmp,
        config_path,
        source_path,
    }
}
