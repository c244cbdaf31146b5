use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use crate::commands::Service;
use crate::remote::{RemoteClient, mirror};
use intake_core::csv_export::export_file_name;
use intake_core::models::{DailyTotals, DaySummary, Entry, Goals, NewEntry, UpdateEntry};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
const DEFAULT_HISTORY_DAYS: u32 = 14;

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<Service>>,
    remote: Option<Arc<RemoteClient>>,
    api_key: Option<String>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, Service> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateEntryRequest {
    date: Option<String>,
    time: Option<String>,
    protein: Option<f64>,
    water: Option<f64>,
    note: Option<String>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateEntryRequest {
    date: Option<String>,
    time: Option<String>,
    protein: Option<f64>,
    water: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    note: Option<Option<String>>,
}

#[derive(Deserialize)]
struct SetGoalsRequest {
    daily_protein: Option<f64>,
    daily_water: Option<f64>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
struct ImportQuery {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

fn parse_date(s: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{s}'. Use YYYY-MM-DD")))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Entries ---

async fn list_entries(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, ApiError> {
    let entries = state.svc().entries().context("database error")?;
    Ok(Json(entries))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<Entry>), ApiError> {
    let date = match req.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => Local::now().date_naive(),
    };
    let new = NewEntry {
        date,
        time: req.time.unwrap_or_default(),
        protein_g: req.protein.unwrap_or(0.0),
        water_l: req.water.unwrap_or(0.0),
        note: req.note,
        owner: None,
    };

    let entry = state.svc().log_entry(&new).map_err(|e| bad_request(&e))?;

    if let Some(remote) = &state.remote {
        mirror("add", remote.append(std::slice::from_ref(&entry))).await;
    }
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Entry>, ApiError> {
    let entry = state.svc().store().get_entry(&id).context("database error")?;
    entry
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Entry {id} not found")))
}

async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEntryRequest>,
) -> Result<Json<Entry>, ApiError> {
    let update = UpdateEntry {
        date: req.date.as_deref().map(parse_date).transpose()?,
        time: req.time,
        protein_g: req.protein,
        water_l: req.water,
        note: req.note,
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }

    let entry = {
        let svc = state.svc();
        if svc.store().get_entry(&id).context("database error")?.is_none() {
            return Err(ApiError::NotFound(format!("Entry {id} not found")));
        }
        svc.update_entry(&id, &update).map_err(|e| bad_request(&e))?
    };

    if let Some(remote) = &state.remote {
        mirror("edit", remote.update(&entry)).await;
    }
    Ok(Json(entry))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.svc().delete_entry(&id).context("database error")?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Entry {id} not found")));
    }
    if let Some(remote) = &state.remote {
        mirror("delete", remote.remove(&id)).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Summaries ---

async fn get_summary(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DaySummary>, ApiError> {
    let date = parse_date(&date)?;
    let summary = state.svc().day_summary(date).context("database error")?;
    Ok(Json(summary))
}

async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<DailyTotals>>, ApiError> {
    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let today = Local::now().date_naive();
    let totals = state.svc().history(days, today).context("database error")?;
    Ok(Json(totals))
}

// --- Goals ---

async fn get_goals(State(state): State<AppState>) -> Result<Json<Goals>, ApiError> {
    let goals = state.svc().goals().context("database error")?;
    Ok(Json(goals))
}

async fn set_goals(
    State(state): State<AppState>,
    Json(req): Json<SetGoalsRequest>,
) -> Result<Json<Goals>, ApiError> {
    let goals = state
        .svc()
        .set_goals(req.daily_protein, req.daily_water)
        .map_err(|e| bad_request(&e))?;
    if let Some(remote) = &state.remote {
        mirror("goals", remote.save_goals(&goals)).await;
    }
    Ok(Json(goals))
}

// --- CSV ---

async fn import_csv(
    State(state): State<AppState>,
    Query(params): Query<ImportQuery>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let import = state
        .svc()
        .import_csv(&body, params.dry_run)
        .context("failed to import CSV")?;

    let synced = match &state.remote {
        Some(remote) if !params.dry_run && !import.entries.is_empty() => {
            Some(mirror("import", remote.append(&import.entries)).await.is_some())
        }
        _ => None,
    };

    Ok(Json(serde_json::json!({
        "dry_run": params.dry_run,
        "rows_read": import.rows_read,
        "imported": import.entries.len(),
        "skipped": import.skipped,
        "synced": synced,
        "entries": import.entries,
    })))
}

async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let csv = state.svc().export_csv().context("failed to export CSV")?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(Local::now().date_naive())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

// --- Router builder ---

/// First and last four characters of the key. Short keys are fully masked.
fn key_hint(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", get(list_entries).post(create_entry))
        .route(
            "/api/entries/{id}",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/api/summary/{date}", get(get_summary))
        .route("/api/history", get(get_history))
        .route("/api/goals", get(get_goals).put(set_goals))
        .route("/api/import", post(import_csv))
        .route("/api/export", get(export_csv))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: Service,
    remote: Option<RemoteClient>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let synced = remote.is_some();
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        remote: remote.map(Arc::new),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_hint(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(%bind, port, synced, "server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
