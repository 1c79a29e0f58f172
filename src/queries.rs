//! Access-controlled read paths over persisted bugs.
//!
//! `bugs_by_website` is the only read with an ownership check; reporter
//! listings are self-scoped and the admin listing is open to any
//! authenticated caller (an inherited policy gap, documented in DESIGN.md
//! rather than silently widened).

use crate::db::DbHandle;
use crate::errors::ReportError;
use crate::models::BugView;

/// All bugs for a website, only if `requester_id` owns it.
pub async fn bugs_by_website(
    db: &DbHandle,
    website_id: i64,
    requester_id: i64,
) -> Result<Vec<BugView>, ReportError> {
    let website = db
        .call(move |db| db.get_website(website_id))
        .await?
        .ok_or_else(|| ReportError::not_found("Website"))?;
    if website.owner_id != requester_id {
        return Err(ReportError::AccessDenied);
    }
    Ok(db.call(move |db| db.bugs_by_website(website_id)).await?)
}

/// All bugs reported by `reporter_id`. Self-scoped, no ownership check.
pub async fn bugs_by_reporter(db: &DbHandle, reporter_id: i64) -> Result<Vec<BugView>, ReportError> {
    Ok(db.call(move |db| db.bugs_by_reporter(reporter_id)).await?)
}

/// Unrestricted listing for the admin view.
pub async fn all_bugs(db: &DbHandle) -> Result<Vec<BugView>, ReportError> {
    Ok(db.call(|db| db.list_bugs()).await?)
}

/// A single bug with reporter and website expanded.
pub async fn bug_by_id(db: &DbHandle, id: i64) -> Result<BugView, ReportError> {
    db.call(move |db| db.get_bug(id))
        .await?
        .ok_or_else(|| ReportError::not_found("Bug"))
}
