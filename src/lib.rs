//! BugHead backend — bug report collection and GitHub issue forwarding.
//!
//! ## Overview
//!
//! Website owners register a (site URL, repository URL) pairing; bug
//! reports arrive from an authenticated dashboard or an unauthenticated
//! embeddable widget, are optionally condensed by an AI summarizer, and are
//! forwarded as issues to the site's GitHub repository. A local `Bug`
//! record is persisted only after the upstream issue exists.
//!
//! ## Module Map
//!
//! | Module       | Responsibility                                        |
//! |--------------|-------------------------------------------------------|
//! | `report`     | Submission pipeline (`ReportPipeline`, the core)      |
//! | `registry`   | Website resolve-or-create, repository URL parsing     |
//! | `github`     | `IssueTracker` trait + reqwest GitHub client          |
//! | `summarizer` | `Summarize` trait + Gemini client, identity fallback  |
//! | `queries`    | Ownership-checked read paths over bugs                |
//! | `db`         | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)   |
//! | `api`        | axum route handlers, `AppState`, `ApiError`           |
//! | `auth`       | Session tokens, password hashing, `AuthUser` extractor|
//! | `server`     | Router assembly, state construction, startup          |

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod github;
pub mod models;
pub mod queries;
pub mod registry;
pub mod report;
pub mod server;
pub mod summarizer;
