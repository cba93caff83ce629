//! # devmirror
//!
//! Keeps a local SQLite mirror of the GitHub accounts and repositories that
//! belong to a geographic community, and serves aggregate views over it.
//!
//! Membership is defined by the free-text `location` of GitHub profiles. A
//! periodic pass discovers every matching account, drops the ones that left,
//! and refreshes the profile and repository list of everyone else.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌────────┐   ┌──────────────┐
//! │ Discovery  │──▶│  Pruner   │──▶│ Syncer │──▶│    SQLite    │
//! │ (search)   │   │ reconcile │   │ N work │   │ accounts     │
//! └────────────┘   └───────────┘   └────────┘   │ repositories │
//!        ▲               Orchestrator           │ run_log      │
//!        │                                      └──────┬───────┘
//!  RateLimiter + Paginator                             │
//!                                  ┌───────────────────┤
//!                                  ▼                   ▼
//!                             ┌──────────┐   ┌──────────────────┐
//!                             │   CLI    │   │ HTTP + Aggregate │
//!                             │(devmirror│   │      cache       │
//!                             └──────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! devmirror init                 # create database
//! devmirror sync                 # run one pass now
//! devmirror languages            # most used languages
//! devmirror serve                # read API + scheduled passes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Provider records and mirror rows |
//! | [`github`] | GitHub REST boundary and reqwest client |
//! | [`rate_limit`] | Quota pauses and bounded quota retry |
//! | [`paginate`] | Multi-page retrieval |
//! | [`discovery`] | Partitioned membership search |
//! | [`syncer`] | Account and repository upsert, staleness pruning |
//! | [`pruner`] | Removal of departed accounts |
//! | [`run_log`] | Pass records |
//! | [`cache`] | Run-keyed aggregate cache |
//! | [`orchestrator`] | Pass sequencing, worker pool, scheduler |
//! | [`queries`] | Read views and local-field operations |
//! | [`server`] | JSON read API |
//! | [`store`] | Mirror writes and point lookups |
//! | [`convert`] | Record, row, and timestamp conversion |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod cache;
pub mod config;
pub mod convert;
pub mod db;
pub mod discovery;
pub mod github;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod paginate;
pub mod pruner;
pub mod queries;
pub mod rate_limit;
pub mod run_log;
pub mod server;
pub mod store;
pub mod syncer;
