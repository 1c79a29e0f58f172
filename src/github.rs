//! GitHub issue-creation client.
//!
//! GitHub is the only supported tracker and is authoritative for issue
//! numbers: the pipeline never guesses or generates one locally. A single
//! attempt is made per submission; any transport or non-2xx failure is a
//! `Tracker` error surfaced to the caller, never retried.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ReportError;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Timeout for the issue-creation call; expiry is a `Tracker` failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A freshly created upstream issue (subset of the response we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub number: i64,
    pub html_url: String,
}

/// Error payload GitHub returns on failure.
#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: Option<String>,
}

/// Seam for substituting a stub tracker in tests.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedIssue, ReportError>;
}

/// reqwest-backed client for the GitHub REST issues endpoint.
///
/// The token is injected at construction and held server-side only; it is
/// never echoed into responses or logs.
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl GitHubClient {
    /// `api_base` is configurable for tests and GitHub Enterprise; the
    /// public default is [`GITHUB_API_BASE`].
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedIssue, ReportError> {
        let url = format!("{}/repos/{}/{}/issues", self.api_base, owner, repo);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "bughead")
            .json(&serde_json::json!({ "title": title, "body": body }))
            .send()
            .await
            .map_err(|e| ReportError::Tracker {
                status: None,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<GitHubErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ReportError::Tracker {
                status: Some(status.as_u16()),
                message,
            });
        }

        let issue = resp
            .json::<CreatedIssue>()
            .await
            .context("Failed to parse issue-creation response from GitHub")
            .map_err(|e| ReportError::Tracker {
                status: Some(status.as_u16()),
                message: e.to_string(),
            })?;
        tracing::info!(owner, repo, number = issue.number, "created GitHub issue");
        Ok(issue)
    }
}
