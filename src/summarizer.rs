//! Best-effort report condensation via Gemini.
//!
//! Summarization must never block or fail a submission: any error from the
//! external call is logged and the raw text is used unchanged. This is the
//! one place in the pipeline where a failure is swallowed instead of
//! surfaced.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Target length for condensed reports, passed to the model as a constraint.
const WORD_BUDGET: usize = 200;

/// Shorter than the tracker timeout; a slow summarizer degrades to the raw
/// text rather than delaying the whole submission further.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Seam for substituting stub summarizers in tests.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, raw: &str) -> Result<String>;
}

/// Condense `raw`, falling back to it unchanged on any failure.
pub async fn summarize_or_original(summarizer: &dyn Summarize, raw: &str) -> String {
    match summarizer.summarize(raw).await {
        Ok(summary) if !summary.trim().is_empty() => summary,
        Ok(_) => {
            tracing::warn!("summarizer returned empty text, keeping original");
            raw.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "summarization failed, keeping original");
            raw.to_string()
        }
    }
}

/// Pass-through summarizer for deployments without an API key.
pub struct NoopSummarizer;

#[async_trait]
impl Summarize for NoopSummarizer {
    async fn summarize(&self, raw: &str) -> Result<String> {
        Ok(raw.to_string())
    }
}

// Response shapes for the generateContent endpoint (subset).

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// reqwest-backed client for the Gemini generateContent endpoint.
pub struct GeminiSummarizer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiSummarizer {
    pub fn with_api_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: GEMINI_MODEL.to_string(),
        }
    }

    fn prompt(raw: &str) -> String {
        format!(
            "Summarize the following bug report into a clear, actionable issue \
             description of at most {} words. Keep concrete reproduction details. \
             Reply with the summary only.\n\n{}",
            WORD_BUDGET, raw
        )
    }
}

#[async_trait]
impl Summarize for GeminiSummarizer {
    async fn summarize(&self, raw: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );
        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": Self::prompt(raw) }] }]
        });

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send summarization request")?
            .error_for_status()
            .context("Summarizer returned error status")?
            .json::<GenerateContentResponse>()
            .await
            .context("Failed to parse summarizer response")?;

        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        if text.trim().is_empty() {
            anyhow::bail!("summarizer returned no candidates");
        }
        Ok(text.trim().to_string())
    }
}
