// Case Tracker - Web Server
// REST API with Axum: case listing/search/detail plus spreadsheet downloads

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use case_tracker::{
    create_case, create_region, create_type_help, delete_case, get_case, get_case_aggregate,
    list_cases, list_regions, list_type_help, privilege_for, search_cases, setup_database,
    update_case, AppConfig, Case, CaseInput, ChildRecord, ExportError, ExportFile, FamilyExpense,
    FamilyIncome, FamilyMember, MedicalExpense, Note, TabularExportBuilder, PERMISSION_DENIED,
    REGION_PERMISSION_DENIED, TYPE_HELP_PERMISSION_DENIED,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<AppConfig>,
    exporter: TabularExportBuilder,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(ApiResponse::<()>::fail(message))).into_response()
}

/// Case response (list rows, labels resolved)
#[derive(Serialize)]
struct CaseResponse {
    id: i64,
    name: String,
    gender: String,
    marriage_status: String,
    birth_date: Option<String>,
    national_id: String,
    type_help: Option<String>,
    region: Option<String>,
}

impl From<Case> for CaseResponse {
    fn from(case: Case) -> Self {
        Self {
            id: case.id,
            gender: case.gender.label().to_string(),
            marriage_status: case.marriage_status.label().to_string(),
            birth_date: case.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            type_help: case.type_help_label().map(str::to_string),
            region: case.region_label().map(str::to_string),
            name: case.name,
            national_id: case.national_id,
        }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
}

#[derive(Deserialize)]
struct RegionRequest {
    region: String,
    #[serde(default)]
    city: String,
}

#[derive(Deserialize)]
struct TypeHelpRequest {
    type_help: String,
}

#[derive(Serialize)]
struct CreatedResponse {
    id: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/cases - All cases
async fn get_cases(State(state): State<AppState>) -> Response {
    let conn = state.db.lock().unwrap();

    match list_cases(&conn) {
        Ok(cases) => {
            let response: Vec<CaseResponse> = cases.into_iter().map(|c| c.into()).collect();
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            error!("Error listing cases: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list cases")
        }
    }
}

/// GET /api/cases/search?query= - Name search (no query, no results)
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let conn = state.db.lock().unwrap();

    match search_cases(&conn, params.query.as_deref()) {
        Ok(cases) => {
            let response: Vec<CaseResponse> = cases.into_iter().map(|c| c.into()).collect();
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            error!("Error searching cases: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to search cases")
        }
    }
}

/// GET /api/cases/:id - Case with all child collections
async fn get_case_detail(State(state): State<AppState>, Path(case_id): Path<i64>) -> Response {
    let conn = state.db.lock().unwrap();

    match get_case_aggregate(&conn, case_id) {
        Ok(Some(aggregate)) => (StatusCode::OK, Json(ApiResponse::ok(aggregate))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Case not found"),
        Err(e) => {
            error!("Error loading case {}: {:#}", case_id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load case")
        }
    }
}

/// Refuse with `denied` unless the caller presents the admin token
fn require_superuser(state: &AppState, headers: &HeaderMap, denied: &str) -> Result<(), Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if privilege_for(&state.config, authorization).is_superuser() {
        Ok(())
    } else {
        warn!("refused: caller is not a superuser ({})", denied);
        Err(failure(StatusCode::FORBIDDEN, denied))
    }
}

fn download(result: Result<ExportFile, ExportError>) -> Response {
    match result {
        Ok(file) => {
            let headers = [
                (header::CONTENT_TYPE, file.content_type.to_string()),
                (header::CONTENT_DISPOSITION, file.content_disposition()),
                (header::ETAG, format!("\"{}\"", file.fingerprint)),
            ];
            (StatusCode::OK, headers, file.bytes).into_response()
        }
        Err(ExportError::NotFound(_)) => failure(StatusCode::NOT_FOUND, "Case not found"),
        Err(e) => {
            error!("Export failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build spreadsheet")
        }
    }
}

/// GET /api/cases/:id/export - One case as a workbook (superuser only)
async fn export_case(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(refused) = require_superuser(&state, &headers, PERMISSION_DENIED) {
        return refused;
    }

    let conn = state.db.lock().unwrap();
    download(state.exporter.export_single_case(&*conn, case_id))
}

/// GET /api/cases/export - Every case as a workbook (superuser only)
async fn export_all(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(refused) = require_superuser(&state, &headers, PERMISSION_DENIED) {
        return refused;
    }

    let conn = state.db.lock().unwrap();
    download(state.exporter.export_all_cases(&*conn))
}

/// POST /api/cases - Create a case
async fn create_case_handler(
    State(state): State<AppState>,
    Json(input): Json<CaseInput>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match create_case(&conn, &input) {
        Ok(id) => {
            info!("Created case {}", id);
            (StatusCode::CREATED, Json(ApiResponse::ok(CreatedResponse { id }))).into_response()
        }
        Err(e) => {
            error!("Error creating case: {:#}", e);
            failure(StatusCode::BAD_REQUEST, "Failed to create case")
        }
    }
}

/// PUT /api/cases/:id - Replace a case's fields
async fn update_case_handler(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    Json(input): Json<CaseInput>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match update_case(&conn, case_id, &input) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok(CreatedResponse { id: case_id })))
            .into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Case not found"),
        Err(e) => {
            error!("Error updating case {}: {:#}", case_id, e);
            failure(StatusCode::BAD_REQUEST, "Failed to update case")
        }
    }
}

/// DELETE /api/cases/:id - Remove a case and everything it owns
async fn delete_case_handler(State(state): State<AppState>, Path(case_id): Path<i64>) -> Response {
    let conn = state.db.lock().unwrap();

    match delete_case(&conn, case_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Case not found"),
        Err(e) => {
            error!("Error deleting case {}: {:#}", case_id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete case")
        }
    }
}

/// POST /api/cases/:id/<collection> - Add a child record to a case
async fn create_child<T>(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    Json(mut record): Json<T>,
) -> Response
where
    T: ChildRecord + DeserializeOwned + Send + 'static,
{
    let conn = state.db.lock().unwrap();

    match get_case(&conn, case_id) {
        Ok(Some(_)) => {}
        Ok(None) => return failure(StatusCode::NOT_FOUND, "Case not found"),
        Err(e) => {
            error!("Error loading case {}: {:#}", case_id, e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load case");
        }
    }

    record.set_case_id(case_id);
    match record.insert(&conn) {
        Ok(id) => (StatusCode::CREATED, Json(ApiResponse::ok(CreatedResponse { id }))).into_response(),
        Err(e) => {
            error!("Error adding record to case {}: {:#}", case_id, e);
            failure(StatusCode::BAD_REQUEST, "Failed to save record")
        }
    }
}

/// PUT /api/cases/:id/<collection>/:item_id - Edit a child record of that case
async fn update_child<T>(
    State(state): State<AppState>,
    Path((case_id, item_id)): Path<(i64, i64)>,
    Json(mut record): Json<T>,
) -> Response
where
    T: ChildRecord + DeserializeOwned + Send + 'static,
{
    let conn = state.db.lock().unwrap();

    record.set_case_id(case_id);
    match record.update(&conn, case_id, item_id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok(CreatedResponse { id: item_id })))
            .into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Record not found"),
        Err(e) => {
            error!("Error updating record {} of case {}: {:#}", item_id, case_id, e);
            failure(StatusCode::BAD_REQUEST, "Failed to save record")
        }
    }
}

/// DELETE /api/cases/:id/<collection>/:item_id - Remove a child record of that case
async fn delete_child<T>(
    State(state): State<AppState>,
    Path((case_id, item_id)): Path<(i64, i64)>,
) -> Response
where
    T: ChildRecord + Send + 'static,
{
    let conn = state.db.lock().unwrap();

    match T::delete(&conn, case_id, item_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Record not found"),
        Err(e) => {
            error!("Error deleting record {} of case {}: {:#}", item_id, case_id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete record")
        }
    }
}

/// Create, edit and delete routes for one child collection
fn child_routes<T>(collection: &str) -> Router<AppState>
where
    T: ChildRecord + DeserializeOwned + Send + 'static,
{
    Router::new()
        .route(&format!("/cases/:id/{}", collection), post(create_child::<T>))
        .route(
            &format!("/cases/:id/{}/:item_id", collection),
            put(update_child::<T>).delete(delete_child::<T>),
        )
}

/// GET /api/regions
async fn get_regions(State(state): State<AppState>) -> Response {
    let conn = state.db.lock().unwrap();

    match list_regions(&conn) {
        Ok(regions) => (StatusCode::OK, Json(ApiResponse::ok(regions))).into_response(),
        Err(e) => {
            error!("Error listing regions: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list regions")
        }
    }
}

/// POST /api/regions - Add a region (superuser only)
async fn add_region(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegionRequest>,
) -> Response {
    if let Err(refused) = require_superuser(&state, &headers, REGION_PERMISSION_DENIED) {
        return refused;
    }

    let conn = state.db.lock().unwrap();
    match create_region(&conn, &request.region, &request.city) {
        Ok(region) => (StatusCode::CREATED, Json(ApiResponse::ok(region))).into_response(),
        Err(e) => {
            error!("Error adding region: {:#}", e);
            failure(StatusCode::BAD_REQUEST, "Failed to add region")
        }
    }
}

/// GET /api/type-help
async fn get_type_help(State(state): State<AppState>) -> Response {
    let conn = state.db.lock().unwrap();

    match list_type_help(&conn) {
        Ok(categories) => (StatusCode::OK, Json(ApiResponse::ok(categories))).into_response(),
        Err(e) => {
            error!("Error listing aid types: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list aid types")
        }
    }
}

/// POST /api/type-help - Add an aid type (superuser only)
async fn add_type_help(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TypeHelpRequest>,
) -> Response {
    if let Err(refused) = require_superuser(&state, &headers, TYPE_HELP_PERMISSION_DENIED) {
        return refused;
    }

    let conn = state.db.lock().unwrap();
    match create_type_help(&conn, &request.type_help) {
        Ok(category) => (StatusCode::CREATED, Json(ApiResponse::ok(category))).into_response(),
        Err(e) => {
            error!("Error adding aid type: {:#}", e);
            failure(StatusCode::BAD_REQUEST, "Failed to add aid type")
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    config.init_tracing();

    info!("🌐 Case Tracker - Web Server");

    let conn = Connection::open(&config.database_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to set up database schema");
    info!("✓ Database opened: {:?}", config.database_path);

    if config.admin_token.is_none() {
        warn!("CASE_TRACKER_ADMIN_TOKEN is not set; exports are disabled");
    }

    let addr = config.bind_addr.clone();

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
        exporter: TabularExportBuilder::new(),
    };

    // Build API routes (static segments before :id)
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/cases", get(get_cases).post(create_case_handler))
        .route("/cases/search", get(search))
        .route("/cases/export", get(export_all))
        .route(
            "/cases/:id",
            get(get_case_detail)
                .put(update_case_handler)
                .delete(delete_case_handler),
        )
        .route("/cases/:id/export", get(export_case))
        .merge(child_routes::<FamilyMember>("members"))
        .merge(child_routes::<FamilyExpense>("expenses"))
        .merge(child_routes::<FamilyIncome>("income"))
        .merge(child_routes::<MedicalExpense>("medical"))
        .merge(child_routes::<Note>("notes"))
        .route("/regions", get(get_regions).post(add_region))
        .route("/type-help", get(get_type_help).post(add_type_help))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("🚀 Server running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
