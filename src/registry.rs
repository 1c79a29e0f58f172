//! Website registry: maps a (site URL, repository URL) pairing to a
//! persisted `Website` row, deduplicated by repository URL.

use anyhow::Result;
use reqwest::Url;

use crate::db::{self, DbHandle};
use crate::errors::ReportError;
use crate::models::Website;

/// Resolve the Website for a repository URL, creating it on first sight.
///
/// The first registrant is authoritative: when a row already exists it is
/// returned unchanged and `owner_id` is never overwritten. The lookup and
/// insert are not one atomic step across processes, so a concurrent first
/// registration can lose the insert race against the UNIQUE constraint on
/// the repository URL; the loser re-fetches the winner and proceeds.
pub async fn resolve_or_create(
    db: &DbHandle,
    repository_url: &str,
    site_url: &str,
    owner_id: i64,
) -> Result<Website, ReportError> {
    validate_url(repository_url, "repository URL")?;
    validate_url(site_url, "site URL")?;

    let repository_url = repository_url.to_string();
    let site_url = site_url.to_string();
    let website = db
        .call(move |db| {
            if let Some(existing) = db.find_website_by_repository_url(&repository_url)? {
                return Ok(existing);
            }
            match db.create_website(owner_id, &site_url, &repository_url) {
                Ok(created) => Ok(created),
                Err(e) if db::is_unique_violation(&e) => db
                    .find_website_by_repository_url(&repository_url)?
                    .ok_or(e),
                Err(e) => Err(e),
            }
        })
        .await?;
    Ok(website)
}

/// Derive `(owner, name)` from a repository URL by taking its last two path
/// segments, stripping a trailing `.git` from the name. A trailing slash is
/// tolerated (empty segments are skipped).
pub fn parse_owner_and_name(repository_url: &str) -> Result<(String, String), ReportError> {
    let malformed = || ReportError::MalformedRepositoryUrl {
        url: repository_url.to_string(),
    };

    let url = Url::parse(repository_url).map_err(|_| malformed())?;
    let segments: Vec<&str> = url
        .path_segments()
        .ok_or_else(malformed)?
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        return Err(malformed());
    }

    let owner = segments[segments.len() - 2].to_string();
    let last = segments[segments.len() - 1];
    let name = last.strip_suffix(".git").unwrap_or(last).to_string();
    if owner.is_empty() || name.is_empty() {
        return Err(malformed());
    }
    Ok((owner, name))
}

/// Well-formed absolute http(s) URL, else `Validation`.
pub fn validate_url(value: &str, field: &str) -> Result<(), ReportError> {
    let url = Url::parse(value)
        .map_err(|_| ReportError::validation(format!("{} is not a valid URL: '{}'", field, value)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ReportError::validation(format!(
            "{} must be an http(s) URL: '{}'",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BugheadDb, DbHandle};

    fn test_handle() -> (DbHandle, i64) {
        let db = BugheadDb::new_in_memory().unwrap();
        let user = db.create_user("Ada", "ada@example.com", "d", "s").unwrap();
        (DbHandle::new(db), user.id)
    }

    // ── parse_owner_and_name ─────────────────────────────────────────

    #[test]
    fn parses_owner_and_name() {
        let (owner, name) = parse_owner_and_name("https://github.com/acme/widget").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(name, "widget");
    }

    #[test]
    fn strips_git_suffix() {
        let (owner, name) = parse_owner_and_name("https://github.com/acme/widget.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(name, "widget");
    }

    #[test]
    fn tolerates_trailing_slash() {
        let (owner, name) = parse_owner_and_name("https://github.com/acme/widget/").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(name, "widget");
    }

    #[test]
    fn single_segment_is_malformed() {
        let err = parse_owner_and_name("https://github.com/acme").unwrap_err();
        assert!(matches!(err, ReportError::MalformedRepositoryUrl { .. }));
    }

    #[test]
    fn bare_host_is_malformed() {
        let err = parse_owner_and_name("https://github.com/").unwrap_err();
        assert!(matches!(err, ReportError::MalformedRepositoryUrl { .. }));
    }

    #[test]
    fn non_url_is_malformed() {
        let err = parse_owner_and_name("not-a-url").unwrap_err();
        assert!(matches!(err, ReportError::MalformedRepositoryUrl { .. }));
    }

    #[test]
    fn nested_path_takes_last_two_segments() {
        // GitLab-style nested groups: last two segments win.
        let (owner, name) =
            parse_owner_and_name("https://github.com/org/team/widget.git").unwrap();
        assert_eq!(owner, "team");
        assert_eq!(name, "widget");
    }

    // ── validate_url ─────────────────────────────────────────────────

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("https://a.com", "site URL").is_ok());
        assert!(validate_url("http://a.com/path", "site URL").is_ok());
    }

    #[test]
    fn rejects_non_urls_and_other_schemes() {
        assert!(matches!(
            validate_url("not-a-url", "site URL").unwrap_err(),
            ReportError::Validation(_)
        ));
        assert!(matches!(
            validate_url("ftp://a.com", "site URL").unwrap_err(),
            ReportError::Validation(_)
        ));
    }

    // ── resolve_or_create ────────────────────────────────────────────

    #[tokio::test]
    async fn creates_on_first_sight() {
        let (db, owner) = test_handle();
        let website = resolve_or_create(&db, "https://github.com/acme/widget.git", "https://a.com", owner)
            .await
            .unwrap();
        assert_eq!(website.owner_id, owner);
        assert_eq!(website.repository_url, "https://github.com/acme/widget.git");
    }

    #[tokio::test]
    async fn reuses_existing_row_and_keeps_first_owner() {
        let (db, first_owner) = test_handle();
        let second_owner = db
            .call(|db| db.create_user("Bob", "bob@example.com", "d", "s"))
            .await
            .unwrap()
            .id;

        let first = resolve_or_create(
            &db,
            "https://github.com/acme/widget.git",
            "https://a.com",
            first_owner,
        )
        .await
        .unwrap();
        // Same repository, different site URL and caller: no new row, no
        // owner overwrite.
        let second = resolve_or_create(
            &db,
            "https://github.com/acme/widget.git",
            "https://b.com",
            second_owner,
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.owner_id, first_owner);
        assert_eq!(second.site_url, "https://a.com");
        let count = db.call(|db| Ok(db.list_websites()?.len())).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rejects_malformed_urls_without_writes() {
        let (db, owner) = test_handle();
        let err = resolve_or_create(&db, "not-a-url", "https://a.com", owner)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        let err = resolve_or_create(&db, "https://github.com/acme/widget", "nope", owner)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        let count = db.call(|db| Ok(db.list_websites()?.len())).await.unwrap();
        assert_eq!(count, 0);
    }
}
