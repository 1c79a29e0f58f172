use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::models::*;

/// Async-safe handle to the bughead database.
///
/// Wraps `BugheadDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BugheadDb>>,
}

impl DbHandle {
    pub fn new(db: BugheadDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BugheadDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct BugheadDb {
    conn: Connection,
}

/// True when an INSERT was rejected by a UNIQUE constraint. Used by the
/// website registry to turn a lost creation race into "re-fetch the winner".
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
        }
        _ => false,
    }
}

impl BugheadDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    password_salt TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS websites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    site_url TEXT NOT NULL,
                    repository_url TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS bugs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    github_issue_number INTEGER NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    reporter_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    website_id INTEGER NOT NULL REFERENCES websites(id) ON DELETE CASCADE,
                    github_url TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_websites_owner ON websites(owner_id);
                CREATE INDEX IF NOT EXISTS idx_bugs_website ON bugs(website_id);
                CREATE INDEX IF NOT EXISTS idx_bugs_reporter ON bugs(reporter_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── User CRUD ─────────────────────────────────────────────────────

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        password_salt: &str,
    ) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (name, email, password_hash, password_salt) VALUES (?1, ?2, ?3, ?4)",
                params![name, email, password_hash, password_salt],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, email, password_hash, password_salt, created_at
                 FROM users WHERE id = ?1",
            )
            .context("Failed to prepare get_user")?;
        let mut rows = stmt
            .query_map(params![id], user_from_row)
            .context("Failed to query user")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, email, password_hash, password_salt, created_at
                 FROM users WHERE email = ?1",
            )
            .context("Failed to prepare find_user_by_email")?;
        let mut rows = stmt
            .query_map(params![email], user_from_row)
            .context("Failed to query user by email")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, email, password_hash, password_salt, created_at
                 FROM users ORDER BY id",
            )
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], user_from_row)
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?);
        }
        Ok(users)
    }

    /// Apply the given profile changes atomically: a failure (say a taken
    /// email) rolls back every field, never leaving a half-applied update.
    pub fn update_user(
        &self,
        id: i64,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<(&str, &str)>,
    ) -> Result<Option<User>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;
        if let Some(name) = name {
            tx.execute("UPDATE users SET name = ?1 WHERE id = ?2", params![name, id])
                .context("Failed to update user name")?;
        }
        if let Some(email) = email {
            tx.execute("UPDATE users SET email = ?1 WHERE id = ?2", params![email, id])
                .context("Failed to update user email")?;
        }
        if let Some((hash, salt)) = password {
            tx.execute(
                "UPDATE users SET password_hash = ?1, password_salt = ?2 WHERE id = ?3",
                params![hash, salt, id],
            )
            .context("Failed to update user password")?;
        }
        tx.commit().context("Failed to commit user update")?;
        self.get_user(id)
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .context("Failed to delete user")?;
        Ok(affected > 0)
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn create_session(&self, token: &str, user_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id) VALUES (?1, ?2)",
                params![token, user_id],
            )
            .context("Failed to insert session")?;
        Ok(())
    }

    pub fn find_session_user(&self, token: &str) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM sessions WHERE token = ?1")
            .context("Failed to prepare find_session_user")?;
        let mut rows = stmt
            .query_map(params![token], |row| row.get::<_, i64>(0))
            .context("Failed to query session")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read session row")?)),
            None => Ok(None),
        }
    }

    // ── Website CRUD ──────────────────────────────────────────────────

    pub fn create_website(
        &self,
        owner_id: i64,
        site_url: &str,
        repository_url: &str,
    ) -> Result<Website> {
        self.conn
            .execute(
                "INSERT INTO websites (owner_id, site_url, repository_url) VALUES (?1, ?2, ?3)",
                params![owner_id, site_url, repository_url],
            )
            .context("Failed to insert website")?;
        let id = self.conn.last_insert_rowid();
        self.get_website(id)?
            .context("Website not found after insert")
    }

    pub fn get_website(&self, id: i64) -> Result<Option<Website>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, site_url, repository_url, created_at
                 FROM websites WHERE id = ?1",
            )
            .context("Failed to prepare get_website")?;
        let mut rows = stmt
            .query_map(params![id], website_from_row)
            .context("Failed to query website")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read website row")?)),
            None => Ok(None),
        }
    }

    pub fn find_website_by_repository_url(&self, repository_url: &str) -> Result<Option<Website>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, site_url, repository_url, created_at
                 FROM websites WHERE repository_url = ?1",
            )
            .context("Failed to prepare find_website_by_repository_url")?;
        let mut rows = stmt
            .query_map(params![repository_url], website_from_row)
            .context("Failed to query website by repository URL")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read website row")?)),
            None => Ok(None),
        }
    }

    pub fn find_website_by_site_url(&self, site_url: &str) -> Result<Option<Website>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, site_url, repository_url, created_at
                 FROM websites WHERE site_url = ?1",
            )
            .context("Failed to prepare find_website_by_site_url")?;
        let mut rows = stmt
            .query_map(params![site_url], website_from_row)
            .context("Failed to query website by site URL")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read website row")?)),
            None => Ok(None),
        }
    }

    pub fn list_websites(&self) -> Result<Vec<Website>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, site_url, repository_url, created_at
                 FROM websites ORDER BY created_at DESC, id DESC",
            )
            .context("Failed to prepare list_websites")?;
        let rows = stmt
            .query_map([], website_from_row)
            .context("Failed to query websites")?;
        let mut websites = Vec::new();
        for row in rows {
            websites.push(row.context("Failed to read website row")?);
        }
        Ok(websites)
    }

    pub fn websites_by_owner(&self, owner_id: i64) -> Result<Vec<Website>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, site_url, repository_url, created_at
                 FROM websites WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .context("Failed to prepare websites_by_owner")?;
        let rows = stmt
            .query_map(params![owner_id], website_from_row)
            .context("Failed to query websites by owner")?;
        let mut websites = Vec::new();
        for row in rows {
            websites.push(row.context("Failed to read website row")?);
        }
        Ok(websites)
    }

    pub fn delete_website(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM websites WHERE id = ?1", params![id])
            .context("Failed to delete website")?;
        Ok(affected > 0)
    }

    // ── Bugs ──────────────────────────────────────────────────────────

    pub fn create_bug(
        &self,
        github_issue_number: i64,
        title: &str,
        description: &str,
        reporter_id: i64,
        website_id: i64,
        github_url: &str,
    ) -> Result<Bug> {
        self.conn
            .execute(
                "INSERT INTO bugs (github_issue_number, title, description, reporter_id, website_id, github_url, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open')",
                params![github_issue_number, title, description, reporter_id, website_id, github_url],
            )
            .context("Failed to insert bug")?;
        let id = self.conn.last_insert_rowid();
        let view = self.get_bug(id)?.context("Bug not found after insert")?;
        Ok(view.bug)
    }

    pub fn get_bug(&self, id: i64) -> Result<Option<BugView>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{BUG_VIEW_SELECT} WHERE b.id = ?1"
            ))
            .context("Failed to prepare get_bug")?;
        let mut rows = stmt
            .query_map(params![id], bug_row_from_row)
            .context("Failed to query bug")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read bug row")?;
                Ok(Some(r.into_view()?))
            }
            None => Ok(None),
        }
    }

    pub fn bugs_by_website(&self, website_id: i64) -> Result<Vec<BugView>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{BUG_VIEW_SELECT} WHERE b.website_id = ?1 ORDER BY b.id"
            ))
            .context("Failed to prepare bugs_by_website")?;
        let rows = stmt
            .query_map(params![website_id], bug_row_from_row)
            .context("Failed to query bugs by website")?;
        collect_bug_views(rows)
    }

    pub fn bugs_by_reporter(&self, reporter_id: i64) -> Result<Vec<BugView>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{BUG_VIEW_SELECT} WHERE b.reporter_id = ?1 ORDER BY b.id"
            ))
            .context("Failed to prepare bugs_by_reporter")?;
        let rows = stmt
            .query_map(params![reporter_id], bug_row_from_row)
            .context("Failed to query bugs by reporter")?;
        collect_bug_views(rows)
    }

    pub fn list_bugs(&self) -> Result<Vec<BugView>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BUG_VIEW_SELECT} ORDER BY b.id"))
            .context("Failed to prepare list_bugs")?;
        let rows = stmt
            .query_map([], bug_row_from_row)
            .context("Failed to query bugs")?;
        collect_bug_views(rows)
    }

    pub fn count_bugs(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM bugs", [], |row| row.get(0))
            .context("Failed to count bugs")
    }
}

const BUG_VIEW_SELECT: &str = "SELECT b.id, b.github_issue_number, b.title, b.description,
        b.reporter_id, b.website_id, b.github_url, b.status, b.created_at,
        u.name, u.email, w.site_url, w.repository_url
 FROM bugs b
 JOIN users u ON u.id = b.reporter_id
 JOIN websites w ON w.id = b.website_id";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        password_salt: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn website_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Website> {
    Ok(Website {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        site_url: row.get(2)?,
        repository_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Raw joined row; status is parsed in `into_view` so bad data surfaces as
/// a descriptive error instead of a rusqlite conversion failure.
struct BugRow {
    id: i64,
    github_issue_number: i64,
    title: String,
    description: String,
    reporter_id: i64,
    website_id: i64,
    github_url: String,
    status: String,
    created_at: String,
    reporter_name: String,
    reporter_email: String,
    site_url: String,
    repository_url: String,
}

impl BugRow {
    fn into_view(self) -> Result<BugView> {
        let status = BugStatus::from_str(&self.status)
            .map_err(|_| anyhow::anyhow!("invalid status in database: '{}'", self.status))?;
        Ok(BugView {
            bug: Bug {
                id: self.id,
                github_issue_number: self.github_issue_number,
                title: self.title,
                description: self.description,
                reporter_id: self.reporter_id,
                website_id: self.website_id,
                github_url: self.github_url,
                status,
                created_at: self.created_at,
            },
            reporter: ReporterRef {
                id: self.reporter_id,
                name: self.reporter_name,
                email: self.reporter_email,
            },
            website: WebsiteRef {
                id: self.website_id,
                site_url: self.site_url,
                repository_url: self.repository_url,
            },
        })
    }
}

fn bug_row_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BugRow> {
    Ok(BugRow {
        id: row.get(0)?,
        github_issue_number: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        reporter_id: row.get(4)?,
        website_id: row.get(5)?,
        github_url: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        reporter_name: row.get(9)?,
        reporter_email: row.get(10)?,
        site_url: row.get(11)?,
        repository_url: row.get(12)?,
    })
}

fn collect_bug_views(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<BugRow>>,
) -> Result<Vec<BugView>> {
    let mut views = Vec::new();
    for row in rows {
        let r = row.context("Failed to read bug row")?;
        views.push(r.into_view()?);
    }
    Ok(views)
}
