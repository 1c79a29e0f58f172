use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthUser};
use crate::db::{self, DbHandle};
use crate::errors::ReportError;
use crate::models::User;
use crate::queries;
use crate::registry;
use crate::report::{ReportPipeline, ReportSubmission};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub pipeline: ReportPipeline,
    /// Userinfo endpoint used to verify Google access tokens; swapped out
    /// in tests.
    pub google_userinfo_url: String,
    pub http: reqwest::Client,
}

pub type SharedState = Arc<AppState>;

pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct GoogleAuthRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterWebsiteRequest {
    pub site_url: String,
    pub repository_url: String,
}

#[derive(Deserialize)]
pub struct ReportBugRequest {
    pub site_url: String,
    pub repository_url: String,
    pub title: String,
    pub body: String,
    pub reporter_name: Option<String>,
}

#[derive(Deserialize)]
pub struct WidgetReportRequest {
    pub website_id: i64,
    pub title: String,
    pub body: String,
    pub category: String,
    pub browser: String,
    pub os: String,
    pub reporter_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct RepoLookupQuery {
    pub site_url: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub message: String,
    #[serde(rename = "issueUrl")]
    pub issue_url: String,
}

#[derive(Serialize)]
pub struct RepoLookupResponse {
    pub owner: String,
    pub name: String,
}

/// Shape of the Google userinfo response (subset).
#[derive(Deserialize)]
struct GoogleUserInfo {
    name: String,
    email: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match &err {
            ReportError::Validation(_) | ReportError::MalformedRepositoryUrl { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            ReportError::AccessDenied => ApiError::Forbidden(err.to_string()),
            ReportError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ReportError::Tracker { .. } => ApiError::BadGateway(err.to_string()),
            ReportError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users/signup", post(signup))
        .route("/api/users/login", post(login))
        .route("/api/users/google-auth", post(google_auth))
        .route("/api/users", get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/websites", get(list_websites).post(register_website))
        .route("/api/websites/repo", get(lookup_repo))
        .route("/api/websites/user/{user_id}", get(websites_by_user))
        .route(
            "/api/websites/{id}",
            get(get_website).delete(delete_website),
        )
        .route("/api/bugs/report", post(report_bug))
        .route("/api/bugs/widget-report", post(widget_report))
        .route("/api/bugs/by-website/{website_id}", get(bugs_by_website))
        .route("/api/bugs/mine", get(my_bugs))
        .route("/api/bugs", get(all_bugs))
        .route("/api/bugs/{id}", get(get_bug))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn signup(
    State(state): State<SharedState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("All fields are required".to_string()));
    }
    let salt = auth::generate_salt();
    let hash = auth::hash_password(&req.password, &salt);
    let token = auth::generate_session_token();

    let email = req.email.clone();
    let name = req.name;
    let session_token = token.clone();
    let user = state
        .db
        .call(move |db| {
            if db.find_user_by_email(&email)?.is_some() {
                anyhow::bail!("User already exists");
            }
            let user = match db.create_user(&name, &email, &hash, &salt) {
                Ok(user) => user,
                // Concurrent signup with the same email: the existence
                // check above is not atomic with the insert.
                Err(e) if db::is_unique_violation(&e) => anyhow::bail!("User already exists"),
                Err(e) => return Err(e),
            };
            db.create_session(&session_token, user.id)?;
            Ok(user)
        })
        .await
        .map_err(|e| {
            if e.to_string().contains("already exists") {
                ApiError::BadRequest(e.to_string())
            } else {
                ApiError::Internal(e.to_string())
            }
        })?;

    tracing::info!(user_id = user.id, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created".to_string(),
            token,
            user,
        }),
    ))
}

async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.clone();
    let user = state
        .db
        .call(move |db| db.find_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    if !auth::verify_password(&req.password, &user.password_salt, &user.password_hash) {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = auth::generate_session_token();
    let session_token = token.clone();
    let user_id = user.id;
    state
        .db
        .call(move |db| db.create_session(&session_token, user_id))
        .await?;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        token,
        user,
    }))
}

async fn google_auth(
    State(state): State<SharedState>,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.token.trim().is_empty() {
        return Err(ApiError::BadRequest("Google token is required".to_string()));
    }

    let info = state
        .http
        .get(&state.google_userinfo_url)
        .header("Authorization", format!("Bearer {}", req.token))
        .send()
        .await
        .map_err(|e| ApiError::BadGateway(format!("Google authentication failed: {}", e)))?
        .error_for_status()
        .map_err(|e| ApiError::Unauthorized(format!("Google authentication failed: {}", e)))?
        .json::<GoogleUserInfo>()
        .await
        .map_err(|e| ApiError::BadGateway(format!("Google authentication failed: {}", e)))?;

    let token = auth::generate_session_token();
    let session_token = token.clone();
    let user = state
        .db
        .call(move |db| {
            let user = match db.find_user_by_email(&info.email)? {
                Some(user) => user,
                None => db.create_user(&info.name, &info.email, auth::GOOGLE_AUTH_SENTINEL, "")?,
            };
            db.create_session(&session_token, user.id)?;
            Ok(user)
        })
        .await?;

    tracing::info!(user_id = user.id, "google auth login");
    Ok(Json(AuthResponse {
        message: "Google authentication successful".to_string(),
        token,
        user,
    }))
}

async fn list_users(
    _auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(users))
}

async fn get_user(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.get_user(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

async fn update_user(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if caller != id {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }
    let password = req.password.map(|p| {
        let salt = auth::generate_salt();
        let hash = auth::hash_password(&p, &salt);
        (hash, salt)
    });
    let user = state
        .db
        .call(move |db| {
            db.update_user(
                id,
                req.name.as_deref(),
                req.email.as_deref(),
                password.as_ref().map(|(h, s)| (h.as_str(), s.as_str())),
            )
        })
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                ApiError::BadRequest("Email already in use".to_string())
            } else {
                ApiError::Internal(e.to_string())
            }
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(serde_json::json!({
        "message": "User updated successfully",
        "user": user
    })))
}

async fn delete_user(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if caller != id {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }
    let deleted = state.db.call(move |db| db.delete_user(id)).await?;
    if !deleted {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    Ok(Json(serde_json::json!({"message": "User deleted successfully"})))
}

async fn register_website(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<RegisterWebsiteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let website =
        registry::resolve_or_create(&state.db, &req.repository_url, &req.site_url, caller).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Website added successfully",
            "website_id": website.id
        })),
    ))
}

async fn list_websites(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let websites = state.db.call(|db| db.list_websites()).await?;
    Ok(Json(websites))
}

async fn lookup_repo(
    State(state): State<SharedState>,
    Query(query): Query<RepoLookupQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let site_url = query.site_url;
    let website = state
        .db
        .call(move |db| db.find_website_by_site_url(&site_url))
        .await?
        .ok_or_else(|| ApiError::NotFound("Website not found".to_string()))?;
    let (owner, name) = registry::parse_owner_and_name(&website.repository_url)?;
    Ok(Json(RepoLookupResponse { owner, name }))
}

async fn websites_by_user(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let websites = state.db.call(move |db| db.websites_by_owner(user_id)).await?;
    Ok(Json(websites))
}

async fn get_website(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let website = state
        .db
        .call(move |db| db.get_website(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Website not found".to_string()))?;
    if website.owner_id != caller {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }
    Ok(Json(website))
}

async fn delete_website(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let website = state
        .db
        .call(move |db| db.get_website(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Website not found".to_string()))?;
    if website.owner_id != caller {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }
    state.db.call(move |db| db.delete_website(id)).await?;
    Ok(Json(serde_json::json!({"message": "Website deleted successfully"})))
}

async fn report_bug(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<ReportBugRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .pipeline
        .submit(ReportSubmission::Dashboard {
            site_url: req.site_url,
            repository_url: req.repository_url,
            title: req.title,
            body: req.body,
            reporter_id: caller,
            reporter_name: req.reporter_name,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReportResponse {
            message: "Bug report successfully submitted to GitHub and saved".to_string(),
            issue_url: report.issue_url,
        }),
    ))
}

async fn widget_report(
    State(state): State<SharedState>,
    Json(req): Json<WidgetReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .pipeline
        .submit(ReportSubmission::Widget {
            website_id: req.website_id,
            title: req.title,
            body: req.body,
            category: req.category,
            browser: req.browser,
            os: req.os,
            reporter_id: req.reporter_id,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReportResponse {
            message: "Bug report from widget submitted successfully".to_string(),
            issue_url: report.issue_url,
        }),
    ))
}

async fn bugs_by_website(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
    Path(website_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let bugs = queries::bugs_by_website(&state.db, website_id, caller).await?;
    Ok(Json(bugs))
}

async fn my_bugs(
    AuthUser(caller): AuthUser,
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let bugs = queries::bugs_by_reporter(&state.db, caller).await?;
    Ok(Json(bugs))
}

async fn all_bugs(
    _auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    // Any authenticated caller may list everything; see DESIGN.md on the
    // missing admin role.
    let bugs = queries::all_bugs(&state.db).await?;
    Ok(Json(bugs))
}

async fn get_bug(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let bug = queries::bug_by_id(&state.db, id).await?;
    Ok(Json(bug))
}
