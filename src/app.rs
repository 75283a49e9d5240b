use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::batch::{Batch, RowUpdate, ValidationError};
use crate::config::ServerConfig;
use crate::downloader::{self, ExportError, ExportFormat, ExportScope};
use crate::grid::{Grid, GridOptions, RowData};
use crate::loader::{self, LoadError};
use crate::login::{self, AuthError, CurrentUser, SessionStore, UserStore};
use crate::saving::{BatchStore, StoreError};
use crate::wizard::{ImportWizard, WizardError};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared state built once at startup
pub struct AppState {
    pub store: Mutex<BatchStore>,
    pub users: UserStore,
    pub sessions: SessionStore,
    pub config: ServerConfig,
}

impl AppState {
    /// Opens the data directory: the users file and the batch store
    pub fn init(config: ServerConfig) -> Result<Arc<Self>, ApiError> {
        let users = UserStore::init(&config.data_dir)?;
        let store = BatchStore::open(&config.data_dir)?;
        info!("data directory: {}", config.data_dir.display());
        Ok(Arc::new(AppState {
            store: Mutex::new(store),
            users,
            sessions: SessionStore::default(),
            config,
        }))
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&BatchStore) -> Result<T, StoreError>,
    ) -> Result<T, ApiError> {
        let store = self
            .store
            .lock()
            .map_err(|_| ApiError::Internal("batch store lock poisoned".to_string()))?;
        Ok(f(&store)?)
    }

    fn shutdown(&self) {
        let expired = self.sessions.purge_expired();
        info!(
            "shutting down: {} live sessions dropped, {} expired",
            self.sessions.len(),
            expired
        );
    }
}

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid CSV: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::BatchNotFound(_) | StoreError::RowNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Store(StoreError::Validation(_) | StoreError::InvalidUser(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(StoreError::Io(_) | StoreError::Encoding(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Auth(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Export(ExportError::Xlsx(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Export(_)
            | ApiError::Load(_)
            | ApiError::Wizard(_)
            | ApiError::Validation(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("request failed: {}", self);
        }
        let body = ErrorBody {
            status: "error",
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Batch metadata with the column list decoded
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchSummary {
    pub id: u64,
    pub file_name: String,
    pub original_name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Batch> for BatchSummary {
    fn from(batch: Batch) -> Self {
        BatchSummary {
            columns: batch.columns(),
            id: batch.id,
            file_name: batch.file_name,
            original_name: batch.original_name,
            row_count: batch.row_count,
            uploaded_at: batch.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GridData {
    pub columns: Vec<String>,
    pub rows: Vec<RowData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveRowsRequest {
    /// Grid rows, each carrying its `id` field
    pub rows: Vec<RowData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ColumnsRequest {
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: Option<String>,
}

impl StatusResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(StatusResponse {
            status: "ok".to_string(),
            message: Some(message.into()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<ExportFormat>,
}

/// Builds the application router
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/batches", get(list_batches).post(upload_batch))
        .route("/api/batches/:id", get(get_batch).delete(delete_batch))
        .route(
            "/api/batches/:id/rows",
            get(batch_rows).put(save_rows).post(create_row),
        )
        .route("/api/batches/:id/columns", put(reorder_columns))
        .route("/api/batches/:id/export", get(export_batch))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .merge(api)
        .route("/auth/signup", post(login::handle_signup))
        .route("/auth/login", post(login::handle_login))
        .route("/auth/logout", post(login::handle_logout))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Runs the server until Ctrl-C
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::init(config)?;
    let app = router(state.clone());

    let listener = TcpListener::bind(state.config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        message: None,
    })
}

async fn list_batches(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<BatchSummary>>, ApiError> {
    let batches = state.with_store(|store| store.list_batches(&user))?;
    Ok(Json(batches.into_iter().map(BatchSummary::from).collect()))
}

async fn get_batch(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
) -> Result<Json<BatchSummary>, ApiError> {
    let batch = state.with_store(|store| store.get_batch(&user, id))?;
    Ok(Json(batch.into()))
}

/// Multipart upload with a `name` text field and a `file` CSV part
async fn upload_batch(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchSummary>), ApiError> {
    let mut wizard = ImportWizard::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "name" => {
                let name = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                wizard.set_batch_name(&name)?;
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                wizard.attach_file(loader::parse_csv_bytes(&file_name, bytes.to_vec())?)?;
            }
            other => warn!("ignoring unexpected upload field {:?}", other),
        }
    }

    wizard.continue_to_review()?;
    let id = wizard.submit(|draft| state.with_store(|store| store.upload_batch(&user, draft)))?;
    let batch = state.with_store(|store| store.get_batch(&user, id))?;
    info!("user {} uploaded batch {} ({} rows)", user, id, batch.row_count);
    Ok((StatusCode::CREATED, Json(batch.into())))
}

async fn delete_batch(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.with_store(|store| store.delete_batch(&user, id))?;
    Ok(StatusResponse::ok("Batch deleted"))
}

fn load_grid_data(state: &AppState, user: &str, id: u64) -> Result<(Batch, GridData), ApiError> {
    state.with_store(|store| {
        let batch = store.get_batch(user, id)?;
        let rows = store
            .batch_rows(user, id)?
            .iter()
            .map(|row| row.to_grid_row())
            .collect();
        let data = GridData {
            columns: batch.columns(),
            rows,
        };
        Ok((batch, data))
    })
}

async fn batch_rows(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
) -> Result<Json<GridData>, ApiError> {
    let (_, data) = load_grid_data(&state, &user, id)?;
    Ok(Json(data))
}

async fn save_rows(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(request): Json<SaveRowsRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let updates = request
        .rows
        .into_iter()
        .map(RowUpdate::from_grid_row)
        .collect::<Result<Vec<_>, _>>()?;

    let count = state.with_store(|store| {
        let owned: BTreeSet<u64> = store.batch_rows(&user, id)?.iter().map(|r| r.id).collect();
        if let Some(stray) = updates.iter().find(|u| !owned.contains(&u.id)) {
            return Err(StoreError::RowNotFound(stray.id));
        }
        store.update_rows(&user, updates)
    })?;
    Ok(StatusResponse::ok(format!("{} rows updated", count)))
}

async fn create_row(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(fields): Json<RowData>,
) -> Result<(StatusCode, Json<RowData>), ApiError> {
    let row = state.with_store(|store| store.create_row(&user, id, fields))?;
    Ok((StatusCode::CREATED, Json(row.to_grid_row())))
}

async fn reorder_columns(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(request): Json<ColumnsRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.with_store(|store| store.reorder_columns(&user, id, &request.columns))?;
    Ok(StatusResponse::ok("Column order updated"))
}

async fn export_batch(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = query.format.unwrap_or_default();
    let (batch, data) = load_grid_data(&state, &user, id)?;
    let grid = Grid::new(data.columns, data.rows, GridOptions::default());
    let body = downloader::export_grid(&grid, ExportScope::All, format)?;

    let file_name = downloader::export_file_name(&batch.file_name, format);
    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
    ];
    Ok((headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::Store(StoreError::BatchNotFound(1)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Store(StoreError::Validation(ValidationError::MissingField("age".into())))
                .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Export(ExportError::NoRows).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_summary_decodes_columns() {
        let batch = Batch {
            id: 3,
            file_name: "Q1".into(),
            original_name: "q1.csv".into(),
            column_headers: "[\"name\",\"age\"]".into(),
            row_count: 2,
            uploaded_at: Utc::now(),
        };
        let summary = BatchSummary::from(batch);
        assert_eq!(summary.columns, vec!["name", "age"]);
    }
}
