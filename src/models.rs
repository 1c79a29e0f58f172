use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A registered account. Password fields never leave the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(skip_serializing, default)]
    pub password_salt: String,
    pub created_at: String,
}

/// One registered site/repository pairing.
///
/// The repository URL is the dedup key: at most one Website exists per
/// distinct repository URL, enforced by a UNIQUE constraint. The first
/// registrant stays the owner; later reports against the same repository
/// reuse the row unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: i64,
    pub owner_id: i64,
    pub site_url: String,
    pub repository_url: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    Open,
    Closed,
}

impl BugStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for BugStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid bug status: {}", s)),
        }
    }
}

/// One reported defect, written only after the upstream issue exists.
///
/// `github_issue_number` is assigned by GitHub and never generated locally.
/// `description` keeps the reporter's original text even when a summarized
/// variant was sent upstream. Rows are append-only; only `status` changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bug {
    pub id: i64,
    pub github_issue_number: i64,
    pub title: String,
    pub description: String,
    pub reporter_id: i64,
    pub website_id: i64,
    pub github_url: String,
    pub status: BugStatus,
    pub created_at: String,
}

// API view types

/// Reporter fields expanded for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterRef {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Website fields expanded for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteRef {
    pub id: i64,
    pub site_url: String,
    pub repository_url: String,
}

/// A Bug with its reporter and website references expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugView {
    #[serde(flatten)]
    pub bug: Bug,
    pub reporter: ReporterRef,
    pub website: WebsiteRef,
}
