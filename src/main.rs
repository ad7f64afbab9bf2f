//! # Shadowdex CLI (`sdx`)
//!
//! The `sdx` binary builds and queries a full-text index that mirrors a
//! relational system-of-record.
//!
//! ## Usage
//!
//! ```bash
//! sdx --config ./config/sdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdx init` | Create the index database and run schema migrations |
//! | `sdx sources` | List configured adapters |
//! | `sdx index` | Rebuild the whole index from the source database |
//! | `sdx sync` | Apply source changes since the last run |
//! | `sdx search "<query>"` | Search as a given user |
//! | `sdx check` | Compare the index with its document catalog |
//! | `sdx stats` | Show index statistics |
//! | `sdx unlock` | Clear a stuck busy flag and sync lock |
//!
//! ## Examples
//!
//! ```bash
//! sdx init
//! sdx index
//! sdx sync --phase add
//! sdx search "welcome -draft" --user 7 --page 2
//! sdx search "exam" --must timetable --doctype forum --admin
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shadowdex::config;
use shadowdex::indexer::{self, PhaseSelection};
use shadowdex::migrate;
use shadowdex::progress::ProgressMode;
use shadowdex::search;
use shadowdex::sources;
use shadowdex::stats;
use shadowdex_core::query::AdvancedQuery;
use shadowdex_core::{SearchRequest, UserContext};

/// Shadowdex: a full-text index that shadows a relational store.
#[derive(Parser)]
#[command(
    name = "sdx",
    about = "Shadowdex: a full-text index that shadows a relational store",
    version,
    long_about = "Shadowdex mirrors rows of a relational system-of-record into a full-text \
    index through configured adapters, keeps it current with differential add/update/delete \
    runs, and answers searches filtered by what the asking user may see."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sdx.toml")]
    config: PathBuf,

    /// Progress output for `index` and `sync` (stderr).
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema.
    ///
    /// Creates the index database and its tables. Safe to run repeatedly.
    Init,

    /// List configured adapters and whether they are synced.
    Sources,

    /// Rebuild the index from scratch.
    ///
    /// Clears the index and the document catalog, then extracts every
    /// instance of every enabled adapter.
    Index,

    /// Apply source changes since the last run.
    Sync {
        /// Phases to run. `all` runs delete, update, then add.
        #[arg(long, value_enum, default_value = "all")]
        phase: PhaseSelection,
    },

    /// Search the index as a given user.
    Search {
        /// Query text: words, "phrases", +required, -excluded, prefix*,
        /// title:word, author:word.
        query: String,

        /// User id the results are filtered for.
        #[arg(long, default_value_t = 0)]
        user: i64,

        /// Search as a site administrator (no filtering).
        #[arg(long, conflicts_with = "guest")]
        admin: bool,

        /// Search as a guest.
        #[arg(long)]
        guest: bool,

        /// Page number (1-based).
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Results per page. Defaults to `search.page_size`.
        #[arg(long)]
        page_size: Option<usize>,

        /// Words that must appear.
        #[arg(long = "must")]
        must: Vec<String>,

        /// Words that must not appear.
        #[arg(long = "not")]
        not: Vec<String>,

        /// Words that may appear.
        #[arg(long = "can")]
        can: Vec<String>,

        /// Restrict to one doctype.
        #[arg(long)]
        doctype: Option<String>,

        /// Word the title must contain.
        #[arg(long)]
        title: Option<String>,

        /// Word the author must contain.
        #[arg(long)]
        author: Option<String>,

        /// Check every hit so the result count is exact.
        #[arg(long)]
        full_scan: bool,
    },

    /// Compare the index with its document catalog.
    Check,

    /// Show index statistics.
    Stats,

    /// Clear the busy flag and any sync lock.
    Unlock,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shadowdex=info,shadowdex_core=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Index => {
            let reporter = cli.progress.reporter();
            indexer::run_index(&cfg, reporter.as_ref()).await?;
        }
        Commands::Sync { phase } => {
            let reporter = cli.progress.reporter();
            indexer::run_sync(&cfg, phase, reporter.as_ref()).await?;
        }
        Commands::Search {
            query,
            user,
            admin,
            guest,
            page,
            page_size,
            must,
            not,
            can,
            doctype,
            title,
            author,
            full_scan,
        } => {
            let user = if admin {
                UserContext::admin(user)
            } else if guest || user <= 0 {
                UserContext::guest()
            } else {
                UserContext::user(user)
            };
            let advanced = AdvancedQuery {
                must_appear: must,
                not_appear: not,
                can_appear: can,
                doc_type: doctype,
                title,
                author,
            };
            let req = SearchRequest::new(query)
                .advanced(advanced)
                .page(page, page_size.unwrap_or(cfg.search.page_size))
                .full_scan(full_scan || cfg.search.full_scan)
                .max_hits(cfg.search.max_hits);
            search::run_search(&cfg, user, req).await?;
        }
        Commands::Check => {
            stats::run_check(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Unlock => {
            stats::run_unlock(&cfg).await?;
        }
    }

    Ok(())
}
