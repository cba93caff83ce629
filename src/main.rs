//! # devmirror CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `devmirror init` | Create the SQLite database and schema |
//! | `devmirror sync` | Run one synchronization pass now |
//! | `devmirror serve` | Start the read API and the pass scheduler |
//! | `devmirror last-run` | Print the stamp of the latest pass |
//! | `devmirror languages` | Languages by repository count |
//! | `devmirror devs` | Accounts ranked by stars |
//! | `devmirror profile <login>` | One account and its repositories |
//! | `devmirror lang <language>` | Owners ranked by stars in a language |
//! | `devmirror search <term>` | Substring search |
//! | `devmirror hide <login>` | Hide an account from every view |
//! | `devmirror admin <login>` | Grant the local admin flag |
//! | `devmirror remove <login>` | Delete an account and its repositories |
//!
//! Log verbosity follows `RUST_LOG` (default `devmirror=info`).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use devmirror::config::{self, Config};
use devmirror::db;
use devmirror::github::GitHubClient;
use devmirror::migrate;
use devmirror::models::AccountKind;
use devmirror::orchestrator::{self, Orchestrator};
use devmirror::queries::{Queries, SearchKind, SearchResults};
use devmirror::server::{self, AppState};

/// Mirror of a geographic GitHub community.
#[derive(Parser)]
#[command(name = "devmirror", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/devmirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Run one synchronization pass in the foreground.
    Sync,

    /// Start the JSON read API.
    ///
    /// Passes run on the configured interval unless `--no-schedule` is given.
    Serve {
        #[arg(long)]
        no_schedule: bool,
    },

    /// Print when the latest pass started.
    LastRun,

    /// Most used languages.
    Languages,

    /// Accounts ranked by total stars.
    Devs {
        /// `individual` or `organization`.
        #[arg(long)]
        kind: Option<AccountKind>,
        /// Case-insensitive company substring.
        #[arg(long)]
        company: Option<String>,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// Show an account and its repositories grouped by language.
    Profile { login: String },

    /// Owners ranked by stars within a language.
    Lang {
        language: String,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// Search accounts (default) or repositories.
    Search {
        term: String,
        #[arg(long)]
        repos: bool,
    },

    /// Hide an account from every view.
    Hide {
        login: String,
        #[arg(long)]
        unhide: bool,
    },

    /// Set the local admin flag of an account.
    Admin {
        login: String,
        #[arg(long)]
        revoke: bool,
    },

    /// Delete an account and its repositories from the mirror.
    Remove { login: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devmirror=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Sync => run_sync(&cfg).await?,
        Commands::Serve { no_schedule } => run_serve(&cfg, !no_schedule).await?,
        Commands::LastRun => {
            let pool = db::connect(&cfg).await?;
            match devmirror::run_log::last_run(&pool).await? {
                Some(ts) => println!("{}", ts.to_rfc3339()),
                None => println!("never"),
            }
        }
        Commands::Languages => {
            let queries = Queries::new(db::connect(&cfg).await?);
            for stat in queries.popular_languages().await? {
                println!(
                    "{:<20} {:>6} repos {:>5} owners",
                    stat.language, stat.repositories, stat.owners
                );
            }
        }
        Commands::Devs {
            kind,
            company,
            limit,
        } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            let accounts = queries.popular_accounts(kind, company.as_deref()).await?;
            for (i, a) in accounts.iter().take(limit).enumerate() {
                println!(
                    "{:>3}. {:<24} {:>7} stars {:>6} forks  {}",
                    i + 1,
                    a.login,
                    a.stars,
                    a.forks,
                    a.name.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Profile { login } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            let Some(view) = queries.profile(&login).await? else {
                bail!("account not found: {}", login);
            };
            let a = &view.account;
            println!("{} ({})", a.login, a.kind);
            if let Some(name) = &a.name {
                println!("  name: {}", name);
            }
            if let Some(company) = &a.company {
                println!("  company: {}", company);
            }
            println!("  stars: {}  forks: {}", view.stars, view.forks);
            for group in &view.languages {
                println!(
                    "  {} ({} stars)",
                    group.language.as_deref().unwrap_or("(none)"),
                    group.stars
                );
                for repo in &group.repositories {
                    println!(
                        "    {:<32} {:>6}",
                        repo.name,
                        repo.stargazers_count.unwrap_or(0)
                    );
                }
            }
        }
        Commands::Lang { language, limit } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            let leaders = queries.language_leaders(&language).await?;
            for (i, leader) in leaders.iter().take(limit).enumerate() {
                println!(
                    "{:>3}. {:<24} {:>7} stars {:>4} repos",
                    i + 1,
                    leader.owner,
                    leader.stars,
                    leader.repositories.len()
                );
            }
        }
        Commands::Search { term, repos } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            let kind = if repos {
                SearchKind::Repositories
            } else {
                SearchKind::Accounts
            };
            match queries.search(&term, kind).await? {
                SearchResults::Accounts(accounts) => {
                    for a in accounts {
                        println!("{:<24} {}", a.login, a.name.as_deref().unwrap_or(""));
                    }
                }
                SearchResults::Repositories(found) => {
                    for r in found {
                        println!(
                            "{}/{:<32} {}",
                            r.owner,
                            r.name,
                            r.description.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }
        Commands::Hide { login, unhide } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            if !queries.set_hidden(&login, !unhide).await? {
                bail!("account not found: {}", login);
            }
            println!("{} {}", login, if unhide { "visible" } else { "hidden" });
        }
        Commands::Admin { login, revoke } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            if !queries.set_admin(&login, !revoke).await? {
                bail!("account not found: {}", login);
            }
            println!("{} admin={}", login, !revoke);
        }
        Commands::Remove { login } => {
            let queries = Queries::new(db::connect(&cfg).await?);
            if !queries.remove_account(&login).await? {
                bail!("account not found: {}", login);
            }
            println!("removed {}", login);
        }
    }

    Ok(())
}

fn build_orchestrator(cfg: &Config, pool: sqlx::SqlitePool) -> Result<Orchestrator> {
    let client = GitHubClient::new(&cfg.github)?;
    Ok(Orchestrator::new(pool, Arc::new(client), cfg))
}

async fn run_sync(cfg: &Config) -> Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::create_schema(&pool).await?;
    let orchestrator = build_orchestrator(cfg, pool)?;

    let Some(report) = orchestrator.run().await? else {
        bail!("a sync pass is already running");
    };
    orchestrator::log_report(&report);

    println!("sync {}", report.started_at.to_rfc3339());
    println!("  discovered: {}", report.discovered);
    println!("  removed: {}", report.removed);
    println!("  accounts upserted: {}", report.upserted);
    println!("  accounts gone: {}", report.gone);
    println!("  failed: {}", report.failed);
    println!("  repositories upserted: {}", report.repos_upserted);
    println!("  repositories pruned: {}", report.repos_pruned);
    println!("ok");
    Ok(())
}

async fn run_serve(cfg: &Config, schedule: bool) -> Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::create_schema(&pool).await?;
    let orchestrator = Arc::new(build_orchestrator(cfg, pool.clone())?);

    if schedule {
        let scheduler = Arc::clone(&orchestrator);
        tokio::spawn(async move { scheduler.run_scheduler().await });
    }

    let state = AppState {
        queries: Arc::new(Queries::with_pass_flag(pool, orchestrator.pass_flag())),
        orchestrator,
    };
    server::run_server(&cfg.server.bind, state).await
}
