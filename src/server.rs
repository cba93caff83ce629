//! JSON read API over the mirror.
//!
//! Hosts the upward interface of the engine: pass control through the
//! [`Orchestrator`] and read-only views through [`Queries`]. There is no
//! authentication; bind to a private address.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/last-run` | Stamp of the latest pass, or `null` |
//! | `GET`  | `/running` | Whether a pass is in progress |
//! | `POST` | `/run` | Start a pass in the background |
//! | `GET`  | `/languages` | Languages by repository count |
//! | `GET`  | `/devs?kind=&company=` | Accounts ranked by stars |
//! | `GET`  | `/devs/{login}` | One account, repositories grouped by language |
//! | `GET`  | `/lang/{language}` | Owners ranked by stars in a language |
//! | `GET`  | `/search?q=&kind=` | Substring search over accounts or repositories |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "q must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Failures of individual accounts during a pass are never reported here.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::models::AccountKind;
use crate::orchestrator::Orchestrator;
use crate::queries::{
    AccountSummary, LanguageLeader, LanguageStat, ProfileView, Queries, SearchKind, SearchResults,
};

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub queries: Arc<Queries>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/last-run", get(handle_last_run))
        .route("/running", get(handle_running))
        .route("/run", post(handle_run))
        .route("/languages", get(handle_languages))
        .route("/devs", get(handle_devs))
        .route("/devs/{login}", get(handle_profile))
        .route("/lang/{language}", get(handle_language))
        .route("/search", get(handle_search))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "read API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

type ApiResponse<T> = Result<Json<T>, AppError>;

// ============ Status ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct LastRunResponse {
    last_run: Option<DateTime<Utc>>,
}

async fn handle_last_run(State(state): State<AppState>) -> ApiResponse<LastRunResponse> {
    let last_run = state.orchestrator.last_run().await?;
    Ok(Json(LastRunResponse { last_run }))
}

#[derive(Serialize)]
struct RunningResponse {
    running: bool,
}

async fn handle_running(State(state): State<AppState>) -> Json<RunningResponse> {
    Json(RunningResponse {
        running: state.orchestrator.running(),
    })
}

#[derive(Serialize)]
struct TriggerResponse {
    started: bool,
}

/// Fire-and-forget; `started` is false when a pass was already running.
async fn handle_run(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    let started = state.orchestrator.trigger();
    (StatusCode::ACCEPTED, Json(TriggerResponse { started }))
}

// ============ Views ============

async fn handle_languages(State(state): State<AppState>) -> ApiResponse<Vec<LanguageStat>> {
    Ok(Json(state.queries.popular_languages().await?))
}

#[derive(Deserialize)]
struct DevsParams {
    kind: Option<String>,
    company: Option<String>,
}

async fn handle_devs(
    State(state): State<AppState>,
    Query(params): Query<DevsParams>,
) -> ApiResponse<Vec<AccountSummary>> {
    let kind = match params.kind.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(k) => Some(k.parse::<AccountKind>().map_err(|e| bad_request(e.to_string()))?),
        None => None,
    };

    let accounts = state
        .queries
        .popular_accounts(kind, params.company.as_deref())
        .await?;
    Ok(Json(accounts))
}

async fn handle_profile(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> ApiResponse<ProfileView> {
    match state.queries.profile(&login).await? {
        Some(profile) => Ok(Json(profile)),
        None => Err(not_found(format!("account not found: {}", login))),
    }
}

async fn handle_language(
    State(state): State<AppState>,
    Path(language): Path<String>,
) -> ApiResponse<Vec<LanguageLeader>> {
    let leaders = state.queries.language_leaders(&language).await?;
    Ok(Json(leaders.as_ref().clone()))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    kind: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResponse<SearchResults> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let kind = match params.kind.as_deref().map(str::trim) {
        None | Some("") | Some("accounts") | Some("devs") => SearchKind::Accounts,
        Some("repositories") | Some("repos") => SearchKind::Repositories,
        Some(other) => {
            return Err(bad_request(format!(
                "unknown search kind: '{}'. Must be accounts or repositories.",
                other
            )))
        }
    };

    Ok(Json(state.queries.search(&params.q, kind).await?))
}
