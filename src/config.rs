//! Typed application configuration.
//!
//! All external credentials are read from the environment exactly once at
//! startup and injected into the components that need them; pipeline logic
//! never reads ambient process state.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::github::GITHUB_API_BASE;
use crate::summarizer::GEMINI_API_BASE;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server-held GitHub credential; required, never sent to browsers.
    pub github_token: String,
    pub github_api_base: String,
    /// Optional; without it summarization is a no-op pass-through.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let github_token =
            std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN is not configured")?;
        let port = match std::env::var("PORT") {
            Ok(v) => v.parse::<u16>().context("PORT is not a valid port number")?,
            Err(_) => 5000,
        };
        let db_path = std::env::var("BUGHEAD_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".bughead/bughead.db"));
        Ok(Self {
            github_token,
            github_api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| GITHUB_API_BASE.to_string()),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_api_base: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| GEMINI_API_BASE.to_string()),
            port,
            db_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable tests mutate process state; keep them in one
    // test to avoid interleaving with parallel test threads.
    #[test]
    fn from_env_reads_required_and_defaulted_fields() {
        unsafe {
            std::env::set_var("GITHUB_TOKEN", "ghp_test");
            std::env::remove_var("PORT");
            std::env::remove_var("BUGHEAD_DB");
            std::env::remove_var("GITHUB_API_BASE");
            std::env::remove_var("GEMINI_API_KEY");
            std::env::remove_var("GEMINI_API_BASE");
        }
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.github_token, "ghp_test");
        assert_eq!(config.port, 5000);
        assert_eq!(config.db_path, PathBuf::from(".bughead/bughead.db"));
        assert_eq!(config.github_api_base, GITHUB_API_BASE);
        assert!(config.gemini_api_key.is_none());

        unsafe {
            std::env::remove_var("GITHUB_TOKEN");
        }
        assert!(AppConfig::from_env().is_err());
    }
}
