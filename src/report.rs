//! Bug report orchestrator — the core submission pipeline.
//!
//! One submission runs sequentially through: input validation, website
//! resolution, best-effort summarization, upstream issue creation, local
//! persistence. Each step is a potential exit point. The critical invariant:
//! a Bug row is written only after the upstream issue exists, and the
//! tracker is called exactly once per submission, so a local record never
//! exists without its issue and one submission never creates two issues.

use std::sync::Arc;

use crate::db::DbHandle;
use crate::errors::ReportError;
use crate::github::IssueTracker;
use crate::models::{Bug, User, Website};
use crate::registry;
use crate::summarizer::{self, Summarize};

/// Attribution name used when a widget report carries no resolvable
/// reporter identity.
pub const ANONYMOUS_REPORTER: &str = "Anonymous";

/// The two submission variants sharing one pipeline.
#[derive(Debug, Clone)]
pub enum ReportSubmission {
    /// Authenticated dashboard form. The website is resolved (or newly
    /// owned) by the caller.
    Dashboard {
        site_url: String,
        repository_url: String,
        title: String,
        body: String,
        reporter_id: i64,
        /// Display name for attribution; the account name is used when absent.
        reporter_name: Option<String>,
    },
    /// Unauthenticated embedded widget. The website must already exist;
    /// the widget never creates one.
    Widget {
        website_id: i64,
        title: String,
        body: String,
        category: String,
        browser: String,
        os: String,
        /// Embedded configuration id. When present it must resolve to a
        /// known user; when absent the website owner is the reporter and
        /// attribution falls back to [`ANONYMOUS_REPORTER`].
        reporter_id: Option<i64>,
    },
}

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct SubmittedReport {
    pub bug: Bug,
    pub issue_url: String,
}

/// The pipeline with its collaborators injected at construction.
pub struct ReportPipeline {
    db: DbHandle,
    tracker: Arc<dyn IssueTracker>,
    summarizer: Arc<dyn Summarize>,
}

struct ResolvedContext {
    website: Website,
    /// Parsed from the repository URL before any row is written, so a
    /// malformed URL exits with no side effects.
    owner: String,
    repo: String,
    reporter_id: i64,
    attribution_name: String,
    attribution_email: Option<String>,
    upstream_title: String,
}

impl ReportPipeline {
    pub fn new(db: DbHandle, tracker: Arc<dyn IssueTracker>, summarizer: Arc<dyn Summarize>) -> Self {
        Self {
            db,
            tracker,
            summarizer,
        }
    }

    /// Run one submission end to end.
    pub async fn submit(&self, submission: ReportSubmission) -> Result<SubmittedReport, ReportError> {
        validate(&submission)?;

        let body = submission_body(&submission).to_string();
        let ctx = self.resolve_context(&submission).await?;

        // Best-effort: a summarizer failure degrades to the raw text and
        // never aborts the submission.
        let upstream_text = summarizer::summarize_or_original(self.summarizer.as_ref(), &body).await;

        let upstream_body = compose_issue_body(
            &ctx.attribution_name,
            ctx.attribution_email.as_deref(),
            &upstream_text,
        );

        // Single attempt; failure here means no Bug row is ever written.
        let issue = self
            .tracker
            .create_issue(&ctx.owner, &ctx.repo, &ctx.upstream_title, &upstream_body)
            .await?;

        let title = ctx.upstream_title.clone();
        let reporter_id = ctx.reporter_id;
        let website_id = ctx.website.id;
        let issue_number = issue.number;
        let issue_url = issue.html_url.clone();
        let bug = self
            .db
            .call(move |db| {
                db.create_bug(issue_number, &title, &body, reporter_id, website_id, &issue_url)
            })
            .await?;

        tracing::info!(
            bug_id = bug.id,
            issue_number,
            website_id,
            reporter_id,
            "bug report persisted"
        );
        Ok(SubmittedReport {
            issue_url: issue.html_url,
            bug,
        })
    }

    async fn resolve_context(
        &self,
        submission: &ReportSubmission,
    ) -> Result<ResolvedContext, ReportError> {
        match submission {
            ReportSubmission::Dashboard {
                site_url,
                repository_url,
                title,
                reporter_id,
                reporter_name,
                ..
            } => {
                // Parse first: a malformed repository URL must fail before
                // resolve_or_create gets a chance to persist a Website.
                let (owner, repo) = registry::parse_owner_and_name(repository_url)?;
                let website =
                    registry::resolve_or_create(&self.db, repository_url, site_url, *reporter_id)
                        .await?;
                let reporter = self
                    .lookup_user(*reporter_id)
                    .await?
                    .ok_or_else(|| ReportError::not_found("User"))?;
                let attribution_name = reporter_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| reporter.name.clone());
                Ok(ResolvedContext {
                    website,
                    owner,
                    repo,
                    reporter_id: reporter.id,
                    attribution_name,
                    attribution_email: Some(reporter.email),
                    upstream_title: title.clone(),
                })
            }
            ReportSubmission::Widget {
                website_id,
                title,
                category,
                browser,
                os,
                reporter_id,
                ..
            } => {
                let id = *website_id;
                let website = self
                    .db
                    .call(move |db| db.get_website(id))
                    .await?
                    .ok_or_else(|| ReportError::not_found("Website"))?;

                let (owner, repo) = registry::parse_owner_and_name(&website.repository_url)?;

                let (reporter_id, attribution_name, attribution_email) = match reporter_id {
                    Some(id) => {
                        let user = self
                            .lookup_user(*id)
                            .await?
                            .ok_or_else(|| ReportError::not_found("User"))?;
                        (user.id, user.name, Some(user.email))
                    }
                    None => (website.owner_id, ANONYMOUS_REPORTER.to_string(), None),
                };

                Ok(ResolvedContext {
                    upstream_title: widget_title(category, browser, os, title),
                    website,
                    owner,
                    repo,
                    reporter_id,
                    attribution_name,
                    attribution_email,
                })
            }
        }
    }

    async fn lookup_user(&self, id: i64) -> Result<Option<User>, ReportError> {
        Ok(self.db.call(move |db| db.get_user(id)).await?)
    }
}

fn submission_body(submission: &ReportSubmission) -> &str {
    match submission {
        ReportSubmission::Dashboard { body, .. } => body,
        ReportSubmission::Widget { body, .. } => body,
    }
}

fn validate(submission: &ReportSubmission) -> Result<(), ReportError> {
    let require = |value: &str, field: &str| {
        if value.trim().is_empty() {
            Err(ReportError::validation(format!("{} is required", field)))
        } else {
            Ok(())
        }
    };
    match submission {
        ReportSubmission::Dashboard {
            site_url,
            repository_url,
            title,
            body,
            ..
        } => {
            require(site_url, "site_url")?;
            require(repository_url, "repository_url")?;
            require(title, "title")?;
            require(body, "body")?;
        }
        ReportSubmission::Widget { title, body, .. } => {
            require(title, "title")?;
            require(body, "body")?;
        }
    }
    Ok(())
}

/// Structured attribution text sent upstream. The persisted Bug keeps the
/// reporter's original description; only this upstream body carries the
/// possibly-summarized variant.
fn compose_issue_body(name: &str, email: Option<&str>, description: &str) -> String {
    let reporter = match email {
        Some(email) => format!("{} ({})", name, email),
        None => name.to_string(),
    };
    format!(
        "**Bug Report by:** {}\n\n**Description:**\n{}",
        reporter, description
    )
}

/// Widget titles carry the environment metadata as a bracketed prefix.
fn widget_title(category: &str, browser: &str, os: &str, title: &str) -> String {
    format!("[{} Bug] on {} ({}): {}", category, browser, os, title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BugheadDb, DbHandle};
    use crate::github::CreatedIssue;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and returns a fixed issue, or fails when told to.
    struct StubTracker {
        fail: bool,
        calls: Mutex<Vec<(String, String, String, String)>>,
        next_number: Mutex<i64>,
    }

    impl StubTracker {
        fn new() -> Self {
            Self {
                fail: false,
                calls: Mutex::new(Vec::new()),
                next_number: Mutex::new(42),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_call(&self) -> (String, String, String, String) {
            self.calls.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl IssueTracker for StubTracker {
        async fn create_issue(
            &self,
            owner: &str,
            repo: &str,
            title: &str,
            body: &str,
        ) -> Result<CreatedIssue, ReportError> {
            self.calls.lock().unwrap().push((
                owner.to_string(),
                repo.to_string(),
                title.to_string(),
                body.to_string(),
            ));
            if self.fail {
                return Err(ReportError::Tracker {
                    status: Some(404),
                    message: "Not Found".to_string(),
                });
            }
            let mut n = self.next_number.lock().unwrap();
            let number = *n;
            *n += 1;
            Ok(CreatedIssue {
                number,
                html_url: format!("https://github.com/{}/{}/issues/{}", owner, repo, number),
            })
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarize for FailingSummarizer {
        async fn summarize(&self, _raw: &str) -> Result<String> {
            anyhow::bail!("model timed out")
        }
    }

    struct FixedSummarizer(&'static str);

    #[async_trait]
    impl Summarize for FixedSummarizer {
        async fn summarize(&self, _raw: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Fixture {
        db: DbHandle,
        tracker: Arc<StubTracker>,
        user_id: i64,
    }

    async fn fixture(tracker: StubTracker, summarizer: Arc<dyn Summarize>) -> (ReportPipeline, Fixture) {
        let db = BugheadDb::new_in_memory().unwrap();
        let user = db.create_user("Ada", "ada@example.com", "d", "s").unwrap();
        let handle = DbHandle::new(db);
        let tracker = Arc::new(tracker);
        let pipeline = ReportPipeline::new(handle.clone(), tracker.clone(), summarizer);
        (
            pipeline,
            Fixture {
                db: handle,
                tracker,
                user_id: user.id,
            },
        )
    }

    fn dashboard_submission(user_id: i64) -> ReportSubmission {
        ReportSubmission::Dashboard {
            site_url: "https://a.com".to_string(),
            repository_url: "https://github.com/acme/widget.git".to_string(),
            title: "Button broken".to_string(),
            body: "click does nothing".to_string(),
            reporter_id: user_id,
            reporter_name: None,
        }
    }

    #[tokio::test]
    async fn successful_submission_persists_one_bug_with_tracker_number() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FixedSummarizer("condensed"))).await;
        let report = pipeline.submit(dashboard_submission(fx.user_id)).await.unwrap();

        assert_eq!(report.bug.github_issue_number, 42);
        assert_eq!(report.issue_url, "https://github.com/acme/widget/issues/42");
        assert_eq!(report.bug.status, crate::models::BugStatus::Open);
        // Original text persisted even though the summary was sent upstream.
        assert_eq!(report.bug.description, "click does nothing");

        let count = fx.db.call(|db| db.count_bugs()).await.unwrap();
        assert_eq!(count, 1);

        let (owner, repo, title, body) = fx.tracker.last_call();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widget");
        assert_eq!(title, "Button broken");
        assert!(body.contains("**Bug Report by:** Ada (ada@example.com)"));
        assert!(body.contains("condensed"));
        assert!(!body.contains("click does nothing"));
    }

    #[tokio::test]
    async fn tracker_failure_aborts_without_persisting() {
        let (pipeline, fx) = fixture(StubTracker::failing(), Arc::new(FailingSummarizer)).await;
        let err = pipeline.submit(dashboard_submission(fx.user_id)).await.unwrap_err();
        assert!(matches!(err, ReportError::Tracker { status: Some(404), .. }));
        assert_eq!(fx.tracker.call_count(), 1);
        let count = fx.db.call(|db| db.count_bugs()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn summarizer_failure_sends_raw_text_upstream() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let report = pipeline.submit(dashboard_submission(fx.user_id)).await.unwrap();
        assert_eq!(report.bug.description, "click does nothing");
        let (_, _, _, body) = fx.tracker.last_call();
        assert!(body.contains("click does nothing"));
        assert!(!body.to_lowercase().contains("error"));
    }

    #[tokio::test]
    async fn missing_fields_fail_validation_with_no_side_effects() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let submission = ReportSubmission::Dashboard {
            site_url: "https://a.com".to_string(),
            repository_url: "https://github.com/acme/widget.git".to_string(),
            title: "".to_string(),
            body: "click does nothing".to_string(),
            reporter_id: fx.user_id,
            reporter_name: None,
        };
        let err = pipeline.submit(submission).await.unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        assert_eq!(fx.tracker.call_count(), 0);
        let websites = fx.db.call(|db| Ok(db.list_websites()?.len())).await.unwrap();
        assert_eq!(websites, 0);
    }

    #[tokio::test]
    async fn malformed_repository_url_creates_nothing() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let submission = ReportSubmission::Dashboard {
            site_url: "https://a.com".to_string(),
            repository_url: "not-a-url".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            reporter_id: fx.user_id,
            reporter_name: None,
        };
        let err = pipeline.submit(submission).await.unwrap_err();
        assert!(matches!(err, ReportError::MalformedRepositoryUrl { .. }));
        assert_eq!(fx.tracker.call_count(), 0);
        let count = fx.db.call(|db| db.count_bugs()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn unparseable_owner_fails_before_website_is_persisted() {
        // Well-formed URL, but only one path segment: validate_url accepts
        // it, so the owner/name parse must run before resolve-or-create.
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let submission = ReportSubmission::Dashboard {
            site_url: "https://a.com".to_string(),
            repository_url: "https://github.com/acme".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            reporter_id: fx.user_id,
            reporter_name: None,
        };
        let err = pipeline.submit(submission).await.unwrap_err();
        assert!(matches!(err, ReportError::MalformedRepositoryUrl { .. }));
        assert_eq!(fx.tracker.call_count(), 0);
        let websites = fx.db.call(|db| Ok(db.list_websites()?.len())).await.unwrap();
        assert_eq!(websites, 0);
    }

    #[tokio::test]
    async fn same_repository_dedups_website_and_keeps_first_owner() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let bob = fx
            .db
            .call(|db| db.create_user("Bob", "bob@example.com", "d", "s"))
            .await
            .unwrap();

        pipeline.submit(dashboard_submission(fx.user_id)).await.unwrap();
        let second = ReportSubmission::Dashboard {
            site_url: "https://b.com".to_string(),
            repository_url: "https://github.com/acme/widget.git".to_string(),
            title: "Another".to_string(),
            body: "still broken".to_string(),
            reporter_id: bob.id,
            reporter_name: None,
        };
        pipeline.submit(second).await.unwrap();

        let websites = fx.db.call(|db| db.list_websites()).await.unwrap();
        assert_eq!(websites.len(), 1);
        assert_eq!(websites[0].owner_id, fx.user_id);
        let count = fx.db.call(|db| db.count_bugs()).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn resubmission_creates_a_second_bug_and_issue() {
        // No request-level idempotency key: identical input twice means two
        // upstream issues and two Bug rows.
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let first = pipeline.submit(dashboard_submission(fx.user_id)).await.unwrap();
        let second = pipeline.submit(dashboard_submission(fx.user_id)).await.unwrap();
        assert_ne!(first.bug.github_issue_number, second.bug.github_issue_number);
        assert_eq!(fx.tracker.call_count(), 2);
        let count = fx.db.call(|db| db.count_bugs()).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn widget_submission_prefixes_title_and_uses_owner_as_reporter() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let website = fx
            .db
            .call({
                let user_id = fx.user_id;
                move |db| db.create_website(user_id, "https://a.com", "https://github.com/acme/widget.git")
            })
            .await
            .unwrap();

        let submission = ReportSubmission::Widget {
            website_id: website.id,
            title: "Button broken".to_string(),
            body: "click does nothing".to_string(),
            category: "UI".to_string(),
            browser: "Chrome".to_string(),
            os: "Windows".to_string(),
            reporter_id: None,
        };
        let report = pipeline.submit(submission).await.unwrap();

        assert_eq!(report.bug.title, "[UI Bug] on Chrome (Windows): Button broken");
        assert_eq!(report.bug.reporter_id, fx.user_id);
        let (_, _, title, body) = fx.tracker.last_call();
        assert_eq!(title, "[UI Bug] on Chrome (Windows): Button broken");
        assert!(body.contains("**Bug Report by:** Anonymous"));
    }

    #[tokio::test]
    async fn widget_submission_requires_existing_website() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let submission = ReportSubmission::Widget {
            website_id: 999,
            title: "t".to_string(),
            body: "b".to_string(),
            category: "UI".to_string(),
            browser: "Chrome".to_string(),
            os: "Windows".to_string(),
            reporter_id: None,
        };
        let err = pipeline.submit(submission).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
        assert_eq!(fx.tracker.call_count(), 0);
    }

    #[tokio::test]
    async fn widget_reporter_id_must_resolve() {
        let (pipeline, fx) = fixture(StubTracker::new(), Arc::new(FailingSummarizer)).await;
        let website = fx
            .db
            .call({
                let user_id = fx.user_id;
                move |db| db.create_website(user_id, "https://a.com", "https://github.com/acme/widget.git")
            })
            .await
            .unwrap();
        let submission = ReportSubmission::Widget {
            website_id: website.id,
            title: "t".to_string(),
            body: "b".to_string(),
            category: "UI".to_string(),
            browser: "Chrome".to_string(),
            os: "Windows".to_string(),
            reporter_id: Some(12345),
        };
        let err = pipeline.submit(submission).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
        assert_eq!(fx.tracker.call_count(), 0);
    }

    #[test]
    fn issue_body_includes_email_when_known() {
        let body = compose_issue_body("Ada", Some("ada@example.com"), "text");
        assert_eq!(
            body,
            "**Bug Report by:** Ada (ada@example.com)\n\n**Description:**\ntext"
        );
        let body = compose_issue_body("Anonymous", None, "text");
        assert_eq!(body, "**Bug Report by:** Anonymous\n\n**Description:**\ntext");
    }
}
