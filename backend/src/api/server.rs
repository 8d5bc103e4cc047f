//! HTTP Server for the sheetmap API.
//!
//! One workbook and one mapping set are held per server process, the way a
//! single-user conversion session works.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                      |
//! |--------|------------------------------------|----------------------------------|
//! | GET    | `/health`                          | Health check                     |
//! | GET    | `/api/logs`                        | SSE stream for real-time logs    |
//! | POST   | `/api/workbook`                    | Upload a workbook (multipart)    |
//! | GET    | `/api/workbook/sheets/{name}`      | Preview a sheet (`?rows=n`)      |
//! | GET    | `/api/mappings`                    | List mapping rules               |
//! | POST   | `/api/mappings`                    | Add a mapping rule               |
//! | PUT    | `/api/mappings`                    | Replace all mapping rules        |
//! | PUT    | `/api/mappings/{id}`               | Update a mapping rule            |
//! | DELETE | `/api/mappings/{id}`               | Delete a mapping rule            |
//! | POST   | `/api/mappings/{id}/move`          | Move a rule to another's place   |
//! | POST   | `/api/convert`                     | Convert the loaded workbook      |
//! | GET    | `/api/conversions`                 | Conversion history               |
//! | GET    | `/api/conversions/{key}`           | One stored conversion            |
//! | DELETE | `/api/conversions/{key}`           | Delete a stored conversion       |
//! | GET    | `/api/conversions/{key}/export`    | Download records as JSON         |
//! | GET    | `/api/storage`                     | Store usage                      |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, log_success, LOG_BROADCASTER};
use super::types::{
    error_response, status_for, ConversionSummary, ConvertRequest, ConvertResponse, MoveRequest,
    SheetPreview, WorkbookResponse,
};
use crate::config::{Settings, DEFAULT_PREVIEW_ROWS, MAX_FILE_SIZE};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::mapping::{MappingRule, MappingSet};
use crate::models::ConversionResult;
use crate::parser::{read_workbook_bytes, Workbook};
use crate::store::{ConversionStore, StorageStatus};
use crate::transform::convert_sheet;

/// Multipart framing allowance on top of the file size limit
const UPLOAD_OVERHEAD: usize = 64 * 1024;

// =============================================================================
// Shared State
// =============================================================================

/// Session state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    workbook: Arc<RwLock<Option<Workbook>>>,
    mappings: Arc<RwLock<MappingSet>>,
    store: Arc<Mutex<ConversionStore>>,
}

impl AppState {
    pub fn new(store: ConversionStore) -> Self {
        Self {
            workbook: Arc::new(RwLock::new(None)),
            mappings: Arc::new(RwLock::new(MappingSet::new())),
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Parse an uploaded workbook and make it current.
    ///
    /// The previous workbook stays loaded when parsing fails.
    pub async fn load_workbook(
        &self,
        bytes: Vec<u8>,
        filename: String,
    ) -> ServerResult<WorkbookResponse> {
        log_info(format!("📄 Upload: {} ({} bytes)", filename, bytes.len()));

        let workbook = tokio::task::spawn_blocking(move || read_workbook_bytes(bytes, &filename))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
            .map_err(PipelineError::from)?;

        log_success(format!(
            "{} sheet(s): {}",
            workbook.sheets.len(),
            workbook.sheet_names().join(", ")
        ));
        let response = WorkbookResponse::from(&workbook);
        *self.workbook.write().await = Some(workbook);
        Ok(response)
    }

    /// First rows of a sheet of the current workbook
    pub async fn sheet_preview(&self, name: &str, rows: usize) -> ServerResult<SheetPreview> {
        let guard = self.workbook.read().await;
        let workbook = guard.as_ref().ok_or_else(no_workbook)?;
        let sheet = workbook.sheet(name).map_err(PipelineError::from)?;
        Ok(SheetPreview::new(sheet, rows))
    }

    pub async fn list_mappings(&self) -> Vec<MappingRule> {
        self.mappings.read().await.list()
    }

    /// Add a rule and return it with its new id
    pub async fn add_mapping(&self, draft: MappingRule) -> ServerResult<MappingRule> {
        let mut mappings = self.mappings.write().await;
        let id = mappings.add(draft)?;
        mappings
            .get(&id)
            .cloned()
            .ok_or_else(|| ServerError::Internal(format!("mapping {} vanished", id)))
    }

    /// Replace the rule at `id`; the id in the path wins over the body
    pub async fn update_mapping(&self, id: &str, patch: MappingRule) -> ServerResult<MappingRule> {
        let patch = patch.with_id(id);
        let mut mappings = self.mappings.write().await;
        mappings.update(patch)?;
        mappings
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(id.to_string()))
    }

    pub async fn delete_mapping(&self, id: &str) -> ServerResult<()> {
        if self.mappings.write().await.delete(id) {
            Ok(())
        } else {
            Err(ServerError::NotFound(id.to_string()))
        }
    }

    /// Move a rule to the anchor's position. Unknown ids leave the order as is.
    pub async fn move_mapping(&self, id: &str, anchor_id: &str) -> Vec<MappingRule> {
        let mut mappings = self.mappings.write().await;
        mappings.reorder(id, anchor_id);
        mappings.list()
    }

    pub async fn replace_mappings(&self, rules: Vec<MappingRule>) -> ServerResult<Vec<MappingRule>> {
        let mut mappings = self.mappings.write().await;
        mappings.replace_all(rules)?;
        Ok(mappings.list())
    }

    /// Convert a sheet of the current workbook with the current mappings.
    ///
    /// The conversion and its save run on the blocking pool; saves are
    /// serialized through the store lock.
    pub async fn convert(&self, request: ConvertRequest) -> ServerResult<ConvertResponse> {
        let (sheet, filename) = {
            let guard = self.workbook.read().await;
            let workbook = guard.as_ref().ok_or_else(no_workbook)?;
            let sheet = workbook
                .sheet_or_first(request.sheet.as_deref())
                .map_err(PipelineError::from)?;
            (sheet.clone(), workbook.filename.clone())
        };

        let mappings = self.mappings.read().await.clone();
        let store = Arc::clone(&self.store);
        let options = request.options;

        let output = tokio::task::spawn_blocking(move || {
            let store = store.blocking_lock();
            convert_sheet(&sheet, &filename, &mappings, &options, Some(&*store))
        })
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
        Ok(ConvertResponse::from(output))
    }

    /// Stored conversions, newest first
    pub async fn list_conversions(&self) -> Vec<ConversionSummary> {
        self.store
            .lock()
            .await
            .list_all()
            .iter()
            .map(ConversionSummary::from)
            .collect()
    }

    pub async fn get_conversion(&self, key: &str) -> ServerResult<ConversionResult> {
        self.store
            .lock()
            .await
            .get(key)
            .ok_or_else(|| ServerError::NotFound(key.to_string()))
    }

    pub async fn delete_conversion(&self, key: &str) -> ServerResult<()> {
        self.store.lock().await.delete(key)?;
        Ok(())
    }

    pub async fn storage_status(&self) -> StorageStatus {
        self.store.lock().await.storage_status()
    }
}

fn no_workbook() -> ServerError {
    ServerError::BadRequest("No workbook loaded, upload one first".to_string())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(error_response(&self.to_string()))).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the API router over a state
pub fn router(state: AppState) -> Router {
    // Permissive CORS for local development
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/logs", get(sse_logs))
        .route("/api/workbook", post(upload_workbook))
        .route("/api/workbook/sheets/{name}", get(preview_sheet))
        .route(
            "/api/mappings",
            get(list_mappings).post(add_mapping).put(replace_mappings),
        )
        .route(
            "/api/mappings/{id}",
            put(update_mapping).delete(delete_mapping),
        )
        .route("/api/mappings/{id}/move", post(move_mapping))
        .route("/api/convert", post(convert))
        .route("/api/conversions", get(list_conversions))
        .route(
            "/api/conversions/{key}",
            get(get_conversion).delete(delete_conversion),
        )
        .route("/api/conversions/{key}/export", get(export_conversion))
        .route("/api/storage", get(storage_status))
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + UPLOAD_OVERHEAD))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = ConversionStore::from_settings(&settings);
    let app = router(AppState::new(store));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    eprintln!("🚀 Sheetmap server running on http://localhost:{}", settings.port);
    eprintln!("   POST /api/workbook - Upload a workbook");
    eprintln!("   POST /api/convert  - Convert with the current mappings");
    eprintln!("   GET  /api/logs     - SSE log stream");
    eprintln!("   GET  /health       - Health check");
    eprintln!("   Store: {}", settings.store_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sheetmap",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip the missed entries
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: expects a multipart field named `file`
async fn upload_workbook(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<WorkbookResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    let filename = file_name.unwrap_or_else(|| "upload.xlsx".to_string());
    Ok(Json(state.load_workbook(bytes, filename).await?))
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    rows: Option<usize>,
}

async fn preview_sheet(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> ServerResult<Json<SheetPreview>> {
    let rows = query.rows.unwrap_or(DEFAULT_PREVIEW_ROWS);
    Ok(Json(state.sheet_preview(&name, rows).await?))
}

async fn list_mappings(State(state): State<AppState>) -> Json<Vec<MappingRule>> {
    Json(state.list_mappings().await)
}

async fn add_mapping(
    State(state): State<AppState>,
    Json(draft): Json<MappingRule>,
) -> ServerResult<(StatusCode, Json<MappingRule>)> {
    let rule = state.add_mapping(draft).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn replace_mappings(
    State(state): State<AppState>,
    Json(rules): Json<Vec<MappingRule>>,
) -> ServerResult<Json<Vec<MappingRule>>> {
    Ok(Json(state.replace_mappings(rules).await?))
}

async fn update_mapping(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<MappingRule>,
) -> ServerResult<Json<MappingRule>> {
    Ok(Json(state.update_mapping(&id, patch).await?))
}

async fn delete_mapping(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    state.delete_mapping(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_mapping(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> Json<Vec<MappingRule>> {
    Json(state.move_mapping(&id, &request.anchor_id).await)
}

async fn convert(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> ServerResult<Json<ConvertResponse>> {
    Ok(Json(state.convert(request).await?))
}

async fn list_conversions(State(state): State<AppState>) -> Json<Vec<ConversionSummary>> {
    Json(state.list_conversions().await)
}

async fn get_conversion(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Json<ConversionResult>> {
    Ok(Json(state.get_conversion(&key).await?))
}

async fn delete_conversion(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<StatusCode> {
    state.delete_conversion(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Records as a pretty JSON attachment
async fn export_conversion(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Response> {
    let result = state.get_conversion(&key).await?;
    let body = result
        .to_json()
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    let disposition = format!("attachment; filename=\"{}\"", result.export_file_name());

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn storage_status(State(state): State<AppState>) -> Json<StorageStatus> {
    Json(state.storage_status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MappingError, SheetError};
    use crate::mapping::ValueType;
    use crate::transform::{ConvertOptions, RowWindow};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    const PRODUCTS_CSV: &[u8] = b"Product;Price;In Stock\nWidget;9.99;yes\nGadget;12;no\nGizmo;3;1\n";

    fn state() -> (AppState, TempDir) {
        let dir = tempdir().unwrap();
        let state = AppState::new(ConversionStore::with_dir(dir.path()));
        (state, dir)
    }

    async fn loaded_state() -> (AppState, TempDir) {
        let (state, dir) = state();
        state
            .load_workbook(PRODUCTS_CSV.to_vec(), "products.csv".into())
            .await
            .unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn test_load_workbook() {
        let (state, _dir) = state();
        let response = state
            .load_workbook(PRODUCTS_CSV.to_vec(), "products.csv".into())
            .await
            .unwrap();

        assert_eq!(response.filename, "products.csv");
        assert_eq!(response.delimiter.as_deref(), Some(";"));
        assert_eq!(response.sheets.len(), 1);
        assert_eq!(response.sheets[0].headers, vec!["Product", "Price", "In Stock"]);
        assert_eq!(response.sheets[0].row_count, 3);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_workbook() {
        let (state, _dir) = loaded_state().await;
        let err = state
            .load_workbook(b"junk".to_vec(), "notes.pdf".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Pipeline(PipelineError::Sheet(SheetError::UnsupportedFormat(_)))
        ));

        let preview = state.sheet_preview("Sheet1", 2).await.unwrap();
        assert_eq!(preview.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_preview_requires_workbook() {
        let (state, _dir) = state();
        let err = state.sheet_preview("Sheet1", 5).await.unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_mapping_crud() {
        let (state, _dir) = state();
        let name = state
            .add_mapping(MappingRule::column("Product", "name", ValueType::String))
            .await
            .unwrap();
        let price = state
            .add_mapping(MappingRule::column("Price", "price", ValueType::Number))
            .await
            .unwrap();

        let updated = state
            .update_mapping(name.id(), MappingRule::column("Product", "title", ValueType::String))
            .await
            .unwrap();
        assert_eq!(updated.target_key(), "title");

        let order = state.move_mapping(price.id(), name.id()).await;
        assert_eq!(order[0].id(), price.id());

        state.delete_mapping(name.id()).await.unwrap();
        assert_eq!(state.list_mappings().await.len(), 1);
        assert!(matches!(
            state.delete_mapping(name.id()).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_mapping_rejects_blank_key() {
        let (state, _dir) = state();
        let err = state
            .add_mapping(MappingRule::column("Product", " ", ValueType::String))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Pipeline(PipelineError::Mapping(MappingError::BlankTargetKey))
        ));
        assert!(state.list_mappings().await.is_empty());
    }

    #[tokio::test]
    async fn test_convert_and_history() {
        let (state, _dir) = loaded_state().await;
        state
            .add_mapping(MappingRule::constant("id", ValueType::Number, 0.0).with_auto_increment())
            .await
            .unwrap();
        state
            .add_mapping(MappingRule::column("Price", "price", ValueType::Number))
            .await
            .unwrap();

        let request = ConvertRequest {
            sheet: None,
            options: ConvertOptions {
                window: RowWindow::new(2, Some(4)).unwrap(),
                no_save: false,
            },
        };
        let response = state.convert(request).await.unwrap();

        assert_eq!(response.status, "ready");
        assert_eq!(response.record_count, 2);
        assert_eq!(response.data[0]["id"], json!(1));
        assert_eq!(response.data[0]["price"], json!(12));
        assert_eq!(response.export_file_name, "products.json");

        let key = response.key.unwrap();
        let history = state.list_conversions().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].key, key);

        let stored = state.get_conversion(&key).await.unwrap();
        assert_eq!(stored.record_count(), 2);

        state.delete_conversion(&key).await.unwrap();
        assert!(matches!(
            state.get_conversion(&key).await,
            Err(ServerError::NotFound(_))
        ));
        assert_eq!(state.storage_status().await.count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_conversions_get_distinct_keys() {
        let (state, _dir) = loaded_state().await;
        state
            .add_mapping(MappingRule::column("Product", "name", ValueType::String))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            state.convert(ConvertRequest::default()),
            state.convert(ConvertRequest::default())
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.record_count, 3);
        assert_ne!(first.key, second.key);
        assert!(first.key.is_some() && second.key.is_some());
        assert_eq!(state.list_conversions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_convert_unknown_sheet() {
        let (state, _dir) = loaded_state().await;
        let request = ConvertRequest {
            sheet: Some("Missing".into()),
            ..Default::default()
        };
        let err = state.convert(request).await.unwrap_err();
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);
    }
}
