#![cfg(feature = "web")]
//! JSON API served to the browser grid.
//!
//! Every handler resolves the caller's session from the `session` cookie,
//! talks to the workbook, and turns whatever goes wrong into a JSON error body;
//! nothing below this layer reaches the client as a crash.

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{self, JoinError};

use crate::columns::{ColumnMap, SchemaError};
use crate::config::AppConfig;
use crate::history::{Summary, search, summarize};
use crate::login::{AuthError, Directory, PermissionPolicy, Session, SessionStore, login};
use crate::reconcile::{ReconcileError, RowFailure, save_changes, timestamp_now};
use crate::record::{Record, Status, Table};
use crate::store::{RecordStore, StoreError, WorkbookStore, load_checked};
use crate::view::{AccessError, WorkingRow, branches, check_editable, visible_rows};

const SESSION_COOKIE: &str = "session";

pub struct AppState {
    config: AppConfig,
    directory: Directory,
    sessions: SessionStore,
    // Serialises read-modify-write cycles on the workbook file
    write_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: AppConfig, directory: Directory) -> Self {
        let sessions = SessionStore::new(config.session_ttl());
        AppState {
            config,
            directory,
            sessions,
            write_lock: Mutex::new(()),
        }
    }

    fn open_active(&self) -> Result<WorkbookStore, StoreError> {
        WorkbookStore::open(&self.config.workbook, &self.config.active_tab)
    }

    fn open_history(&self) -> Result<WorkbookStore, StoreError> {
        WorkbookStore::open(&self.config.workbook, &self.config.history_tab)
    }

    fn session(&self, jar: &CookieJar) -> Result<Session, ApiError> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.sessions.validate(cookie.value()))
            .ok_or(ApiError::Auth(AuthError::NoSession))
    }
}

/// Errors as the client sees them
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0}")]
    Forbidden(String),

    #[error("worker task failed: {0}")]
    Worker(#[from] JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::UnknownUser(_) | AuthError::BadSecret | AuthError::NoSession) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(StoreError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(StoreError::Schema(_)) | ApiError::Schema(_) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Write { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Reconcile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Access(_) | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            // Do not reveal which of the two was wrong
            ApiError::Auth(AuthError::UnknownUser(_) | AuthError::BadSecret) => {
                "invalid email or password".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("request failed ({}): {}", status, self);
        (status, Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    email: String,
    role: crate::login::Role,
    branch: String,
    expires_at: String,
}

/// One row of the grid as exchanged with the browser
#[derive(Serialize, Deserialize)]
pub struct RowDto {
    position: usize,
    #[serde(default)]
    row: usize,
    values: Map<String, Value>,
}

impl RowDto {
    fn from_working(row: &WorkingRow) -> Self {
        RowDto {
            position: row.position,
            row: row.physical_row(),
            values: row.record.to_json(),
        }
    }

    fn to_working(&self) -> WorkingRow {
        WorkingRow::new(self.position, Record::from_json(&self.values))
    }
}

#[derive(Deserialize)]
struct RecordsQuery {
    branch: Option<String>,
}

#[derive(Serialize)]
struct RecordsResponse {
    headers: Vec<String>,
    rows: Vec<RowDto>,
    /// Headers of the columns the caller may edit
    editable: Vec<String>,
    statuses: Vec<&'static str>,
    message: String,
}

#[derive(Deserialize)]
pub struct SaveRequest {
    original: Vec<RowDto>,
    edited: Vec<RowDto>,
}

#[derive(Serialize)]
struct SaveResponse {
    ok: bool,
    message: String,
    rows_written: Vec<usize>,
    cells_written: usize,
    failures: Vec<FailureDto>,
}

#[derive(Serialize)]
struct FailureDto {
    row: usize,
    message: String,
}

impl From<RowFailure> for FailureDto {
    fn from(failure: RowFailure) -> Self {
        FailureDto {
            row: failure.row,
            message: failure.message,
        }
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct HistoryResponse {
    headers: Vec<String>,
    records: Vec<Map<String, Value>>,
}

/// Build the router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/records", get(list_records))
        .route("/api/records/save", post(save_records))
        .route("/api/branches", get(list_branches))
        .route("/api/history", get(search_history))
        .route("/api/history/summary", get(history_summary))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Start the web server
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let directory = Directory::load(&config.users_file)?;
    if directory.is_empty() {
        warn!("no users registered; add one with `credit-desk-cli add-user`");
    }

    let bind = config.bind.clone();
    let app = router(Arc::new(AppState::new(config, directory)));

    let listener = TcpListener::bind(&bind).await?;
    info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status(),
        started.elapsed().as_millis()
    );
    response
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    // Argon2 verification runs on the blocking pool
    let session = task::spawn_blocking(move || {
        login(&state.directory, &state.sessions, &request.email, &request.password)
    })
    .await??;
    let cookie = Cookie::build((SESSION_COOKIE, session.id.clone()))
        .path("/")
        .http_only(true);

    let body = LoginResponse {
        email: session.identity.email.clone(),
        role: session.identity.role,
        branch: session.identity.branch.clone(),
        expires_at: session.expires_at.to_rfc3339(),
    };
    Ok((jar.add(cookie), Json(body)))
}

async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.end(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

fn editable_headers(state: &AppState, session: &Session, columns: &ColumnMap) -> Vec<String> {
    state
        .directory
        .permissions_for(session.identity.role)
        .into_iter()
        .map(|field| columns.header(field).to_string())
        .collect()
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let session = state.session(&jar)?;
    let mut store = state.open_active()?;
    let (table, columns) = load_checked(&mut store, &state.config.columns)?;

    let rows = visible_rows(&table, &columns, &session.identity, query.branch.as_deref())?;
    let message = if rows.is_empty() {
        "no records assigned".to_string()
    } else {
        format!("showing {} records", rows.len())
    };

    Ok(Json(RecordsResponse {
        editable: editable_headers(&state, &session, &columns),
        rows: rows.iter().map(RowDto::from_working).collect(),
        headers: table.headers,
        statuses: Status::ALL.iter().map(|s| s.as_str()).collect(),
        message,
    }))
}

/// Reload, check ownership and write; runs on the blocking pool since every
/// cell write rewrites the workbook file
fn save_blocking(state: &AppState, session: &Session, request: &SaveRequest) -> Result<SaveResponse, ApiError> {
    let _guard = state.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut store = state.open_active()?;
    let (table, columns) = load_checked(&mut store, &state.config.columns)?;

    let original: Vec<WorkingRow> = request.original.iter().map(RowDto::to_working).collect();
    let edited: Vec<WorkingRow> = request.edited.iter().map(RowDto::to_working).collect();
    check_editable(&session.identity, &table, &columns, &edited)?;

    let writable = state.directory.permissions_for(session.identity.role);
    let report = save_changes(&mut store, &original, &edited, &columns, &writable, &timestamp_now())?;

    info!("{} saved: {}", session.identity.email, report.message());
    Ok(SaveResponse {
        ok: report.is_clean(),
        message: report.message(),
        rows_written: report.rows_written,
        cells_written: report.cells_written,
        failures: report.failures.into_iter().map(FailureDto::from).collect(),
    })
}

async fn save_records(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    let session = state.session(&jar)?;
    let response = task::spawn_blocking(move || save_blocking(&state, &session, &request)).await??;
    Ok(Json(response))
}

async fn list_branches(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<Vec<String>>, ApiError> {
    let session = state.session(&jar)?;
    if !session.identity.is_admin() {
        return Err(ApiError::Forbidden("only the administrator can filter by branch".to_string()));
    }
    let mut store = state.open_active()?;
    let (table, columns) = load_checked(&mut store, &state.config.columns)?;
    Ok(Json(branches(&table, &columns)))
}

fn load_history(state: &AppState) -> Result<Table, ApiError> {
    Ok(state.open_history()?.load()?)
}

async fn search_history(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    state.session(&jar)?;
    let table = load_history(&state)?;
    let records = search(&table.records, &query.q)
        .into_iter()
        .map(Record::to_json)
        .collect();
    Ok(Json(HistoryResponse {
        headers: table.headers,
        records,
    }))
}

async fn history_summary(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Summary>, ApiError> {
    state.session(&jar)?;
    let table = load_history(&state)?;
    let hits = search(&table.records, &query.q);
    Ok(Json(summarize(hits, &table.headers, &state.config.columns)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::Role;
    use crate::record::CellValue;
    use crate::saving::save_workbook;
    use crate::workbook::{Grid, Workbook};
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> Arc<AppState> {
        let workbook_path = dir.path().join("base.bin.gz");
        let mut grid = Grid::with_header(&ColumnMap::default().header_row());
        for email in ["a@x.com", "b@x.com"] {
            let mut row = vec![CellValue::Empty; 15];
            row[9] = CellValue::Text(email.to_string());
            row[10] = CellValue::Text("Proceso".to_string());
            grid.push_row(row);
        }
        let mut workbook = Workbook::new();
        workbook.insert_tab("Clientes", grid);
        save_workbook(&workbook, &workbook_path).unwrap();

        let mut directory = Directory::default();
        directory
            .add_user("a@x.com", "clave", "Sucursal Masaya", Role::Manager)
            .unwrap();
        let config = AppConfig {
            workbook: workbook_path,
            ..AppConfig::default()
        };
        Arc::new(AppState::new(config, directory))
    }

    fn credentials(password: &str) -> LoginRequest {
        LoginRequest {
            email: " A@x.com".to_string(),
            password: password.to_string(),
        }
    }

    fn status_edit(state: &AppState, position: usize) -> SaveRequest {
        let table = state.open_active().unwrap().load().unwrap();
        let original = WorkingRow::new(position, table.records[position].clone());
        let mut edited = original.clone();
        edited.record.set("Status", CellValue::Text("Denegado".to_string()));
        SaveRequest {
            original: vec![RowDto::from_working(&original)],
            edited: vec![RowDto::from_working(&edited)],
        }
    }

    #[tokio::test]
    async fn login_sets_a_session_cookie_and_hides_the_failure_reason() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let (jar, _) = handle_login(State(Arc::clone(&state)), CookieJar::new(), Json(credentials("clave")))
            .await
            .unwrap();
        assert!(state.session(&jar).is_ok());

        let Err(err) = handle_login(State(Arc::clone(&state)), CookieJar::new(), Json(credentials("otra"))).await
        else {
            panic!("a wrong password must not log in");
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message(), "invalid email or password");
    }

    #[tokio::test]
    async fn managers_can_save_only_their_own_rows() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let (jar, _) = handle_login(State(Arc::clone(&state)), CookieJar::new(), Json(credentials("clave")))
            .await
            .unwrap();

        let foreign = status_edit(&state, 1);
        let Err(err) = save_records(State(Arc::clone(&state)), jar.clone(), Json(foreign)).await else {
            panic!("row 3 belongs to b@x.com");
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let table = state.open_active().unwrap().load().unwrap();
        assert_eq!(table.records[1].text("Status"), "Proceso");

        let own = status_edit(&state, 0);
        let Ok(Json(response)) = save_records(State(Arc::clone(&state)), jar, Json(own)).await else {
            panic!("row 2 belongs to a@x.com");
        };
        assert!(response.ok);
        assert_eq!(response.rows_written, vec![2]);
        assert_eq!(response.cells_written, 5);
    }

    #[tokio::test]
    async fn saving_without_a_session_is_unauthorized() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let request = status_edit(&state, 0);
        let Err(err) = save_records(State(state), CookieJar::new(), Json(request)).await else {
            panic!("no cookie, no save");
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
