//! REST API for the stowage service.
//!
//! Thin HTTP adapter over [`StowageService`]. Uses Axum as the web framework
//! and supports CORS. Every mutating request may name the acting user with
//! `userId`; it ends up in the action log served by `GET /api/logs`.

use std::sync::{Arc, OnceLock};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::action_log::{ActionType, LogEntry, LogFilter};
use crate::config::ApiConfig;
use crate::error::{EntityKind, StowageError};
use crate::geometry::Position;
use crate::model::{Container, Item, Placement};
use crate::planner::{Bucket, PlanEvent};
use crate::rearrange::{RearrangementAction, RearrangementStep};
use crate::retrieval::{RetrievalAction, RetrievalStep};
use crate::service::{ContainerUsage, IngestReport, ItemStatus, StowageService};
use crate::store::{MemoryStore, PlacementStore};
use crate::types::Coordinates;

/// Shared state: one service behind one async lock.
///
/// The lock is what serialises writes per container, which the service
/// leaves to its caller.
#[derive(Clone)]
pub struct ApiState {
    service: Arc<Mutex<StowageService<MemoryStore>>>,
}

impl ApiState {
    pub fn new(service: StowageService<MemoryStore>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
        }
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>stow-it-now API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Bulk ingestion request.
///
/// `containers` are registered (or updated) before planning; containers
/// registered by earlier requests stay available.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "items": [
            {
                "itemId": "I1",
                "width": 4.0, "depth": 4.0, "height": 4.0,
                "priority": 95,
                "preferredZone": "A"
            }
        ],
        "containers": [
            { "containerId": "C1", "zone": "A", "width": 10.0, "depth": 10.0, "height": 10.0 }
        ]
    })
)]
pub struct PlacementRequest {
    pub items: Vec<Item>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResponse {
    pub success: bool,
    pub placements: Vec<Placement>,
    pub unplaced: Vec<UnplacedEntry>,
    pub rearrangements: Vec<RearrangementStep>,
    /// Items that keep their previous placement.
    pub retained: Vec<Placement>,
    pub rounds: usize,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedEntry {
    pub item_id: String,
    pub reason_code: String,
    pub reason: String,
}

impl PlacementResponse {
    fn from_report(report: IngestReport) -> Self {
        let IngestReport {
            plan,
            rearrangement,
        } = report;

        Self {
            success: true,
            unplaced: plan
                .unplaced
                .iter()
                .map(|entry| UnplacedEntry {
                    item_id: entry.item.item_id.clone(),
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.error().to_string(),
                })
                .collect(),
            rounds: plan.rounds,
            placements: plan.placements,
            rearrangements: rearrangement.steps,
            retained: rearrangement.retained,
        }
    }
}

/// Manual placement of one known item at an explicit box.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    pub item_id: String,
    pub container_id: String,
    pub position: Position,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PlaceResponse {
    pub success: bool,
    pub placement: Placement,
}

/// Search by exact id or, failing that, by partial name.
#[derive(Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub id: Option<String>,
    /// Case-insensitive substring of the item name. The first match by id
    /// order is returned.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub item: Item,
    /// Absent while the item is not stowed anywhere.
    pub placement: Option<Placement>,
    pub retrieval_steps: Vec<RetrievalStep>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisposeRequest {
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DisposeResponse {
    pub success: bool,
    pub removed: usize,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WasteRequest {
    pub item_id: String,
    pub reason: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct WasteResponse {
    pub success: bool,
    pub item: Item,
}

#[derive(Serialize, ToSchema)]
pub struct ItemListResponse {
    pub success: bool,
    pub items: Vec<ItemStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct ContainerListResponse {
    pub success: bool,
    pub containers: Vec<ContainerUsage>,
}

/// Matching action log entries, newest first.
#[derive(Serialize, ToSchema)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn rejection_response(err: impl std::fmt::Display) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "invalid_request",
        err.to_string(),
    )
}

fn status_for(err: &StowageError) -> StatusCode {
    match err {
        StowageError::Validation { .. }
        | StowageError::Capacity { .. }
        | StowageError::RetryExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StowageError::NotFound { .. } => StatusCode::NOT_FOUND,
        StowageError::Overlap { .. } => StatusCode::CONFLICT,
        StowageError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn stowage_error_response(err: StowageError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(%err, "❌ Request failed");
    } else {
        warn!(code = err.code(), %err, "Request rejected");
    }
    error_response(status, err.code(), err.to_string())
}

fn parse_placement_request(
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Result<PlacementRequest, Response> {
    let Json(payload) = payload.map_err(rejection_response)?;
    if payload.items.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "At least one item must be specified",
        ));
    }
    Ok(payload)
}

/// Resolves the item a search points at.
fn find_search_target(
    service: &StowageService<MemoryStore>,
    query: &SearchQuery,
) -> Result<Item, Response> {
    let found = match (query.id.as_deref(), query.name.as_deref()) {
        (Some(id), _) => service.store().get_item(id).and_then(|item| {
            item.ok_or_else(|| StowageError::not_found(EntityKind::Item, id))
        }),
        (None, Some(name)) => service.find_items_by_name(name).and_then(|items| {
            items
                .into_iter()
                .next()
                .ok_or_else(|| StowageError::not_found(EntityKind::Item, name))
        }),
        (None, None) => return Err(rejection_response("either `id` or `name` must be given")),
    };
    found.map_err(stowage_error_response)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_placement,
        handle_placement_stream,
        handle_place,
        handle_search,
        handle_dispose,
        handle_waste,
        handle_list_items,
        handle_list_containers,
        handle_logs
    ),
    components(
        schemas(
            PlacementRequest,
            PlacementResponse,
            UnplacedEntry,
            PlaceRequest,
            PlaceResponse,
            SearchResponse,
            DisposeRequest,
            DisposeResponse,
            WasteRequest,
            WasteResponse,
            ItemListResponse,
            ContainerListResponse,
            LogsResponse,
            ItemStatus,
            ContainerUsage,
            LogEntry,
            ActionType,
            ErrorResponse,
            Item,
            Container,
            Placement,
            Position,
            Coordinates,
            RearrangementStep,
            RearrangementAction,
            RetrievalStep,
            RetrievalAction,
            PlanEvent,
            Bucket
        )
    ),
    tags((name = "stowage", description = "Placement, retrieval and disposal of stowed items"))
)]
struct ApiDoc;

/// Builds the router with all endpoints.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/placement", post(handle_placement))
        .route("/placement_stream", post(handle_placement_stream))
        .route("/place", post(handle_place))
        .route("/search", get(handle_search))
        .route("/dispose", post(handle_dispose))
        .route("/waste", post(handle_waste))
        .route("/api/items", get(handle_list_items))
        .route("/api/containers", get(handle_list_containers))
        .route("/api/logs", get(handle_logs))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(config: ApiConfig, state: ApiState) -> std::io::Result<()> {
    let app = router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /placement, POST /placement_stream, POST /place, GET /search, POST /dispose, POST /waste");
    info!("📋 Listings: GET /api/items, GET /api/containers, GET /api/logs");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /placement.
///
/// Plans the given items into all known containers and returns the new
/// placements plus the steps needed to move previously stowed items.
#[utoipa::path(
    post,
    path = "/placement",
    request_body = PlacementRequest,
    responses(
        (status = 200, description = "Placement planned", body = PlacementResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid items or containers",
            body = ErrorResponse
        )
    ),
    tag = "stowage"
)]
async fn handle_placement(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Response {
    let request = match parse_placement_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        items = request.items.len(),
        containers = request.containers.len(),
        "📥 New placement request"
    );
    let mut service = state.service.lock().await;
    match service.ingest_with_progress(
        request.items,
        request.containers,
        request.user_id.as_deref(),
        |_| {},
    ) {
        Ok(report) => (StatusCode::OK, Json(PlacementResponse::from_report(report))).into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for POST /placement_stream (SSE).
///
/// Sends the planner events of the final planning pass as Server-Sent
/// Events. When earlier placements have to be pinned the planner runs more
/// than once, so events arrive only after planning has settled, never while
/// a pass is still running. A final event of type `Error` is sent if
/// planning fails.
#[utoipa::path(
    post,
    path = "/placement_stream",
    request_body = PlacementRequest,
    responses(
        (
            status = 200,
            description = "Planner events of the final planning pass, sent once planning has settled",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request",
            body = ErrorResponse
        )
    ),
    tag = "stowage"
)]
async fn handle_placement_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Response {
    let request = match parse_placement_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);
    let mut service = state.service.clone().lock_owned().await;

    tokio::task::spawn_blocking(move || {
        let PlacementRequest {
            items,
            containers,
            user_id,
        } = request;
        let result = service.ingest_with_progress(items, containers, user_id.as_deref(), |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver only means the client went away.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = result {
            warn!(code = err.code(), %err, "Streamed placement failed");
            let payload = json!({
                "type": "Error",
                "error": err.code(),
                "details": err.to_string(),
            });
            let _ = tx.blocking_send(payload.to_string());
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /place: records a manual placement.
#[utoipa::path(
    post,
    path = "/place",
    request_body = PlaceRequest,
    responses(
        (status = 200, description = "Placement recorded", body = PlaceResponse),
        (status = NOT_FOUND, description = "Unknown item or container", body = ErrorResponse),
        (status = CONFLICT, description = "Box overlaps another item", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed box", body = ErrorResponse)
    ),
    tag = "stowage"
)]
async fn handle_place(
    State(state): State<ApiState>,
    payload: Result<Json<PlaceRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection_response(err),
    };

    let mut service = state.service.lock().await;
    match service.place_item(
        &request.item_id,
        &request.container_id,
        request.position,
        request.user_id.as_deref(),
    ) {
        Ok(placement) => Json(PlaceResponse {
            success: true,
            placement,
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for GET /search: looks up an item and plans its retrieval.
///
/// `id` wins over `name` when both are given. Planning a retrieval is
/// recorded in the action log.
#[utoipa::path(
    get,
    path = "/search",
    params(
        ("id" = Option<String>, Query, description = "Item id"),
        ("name" = Option<String>, Query, description = "Case-insensitive part of the item name"),
        ("userId" = Option<String>, Query, description = "Acting user, for the action log")
    ),
    responses(
        (status = 200, description = "Item found", body = SearchResponse),
        (status = NOT_FOUND, description = "No matching item", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Neither id nor name given", body = ErrorResponse)
    ),
    tag = "stowage"
)]
async fn handle_search(
    State(state): State<ApiState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(err) => return rejection_response(err),
    };

    let mut service = state.service.lock().await;
    let item = match find_search_target(&service, &query) {
        Ok(item) => item,
        Err(response) => return response,
    };

    match service.plan_retrieval(&item.item_id, query.user_id.as_deref()) {
        Ok(plan) => Json(SearchResponse {
            success: true,
            item,
            placement: Some(plan.target),
            retrieval_steps: plan.steps,
        })
        .into_response(),
        Err(StowageError::NotFound {
            kind: EntityKind::Placement,
            ..
        }) => Json(SearchResponse {
            success: true,
            item,
            placement: None,
            retrieval_steps: Vec::new(),
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for POST /dispose: removes placements.
#[utoipa::path(
    post,
    path = "/dispose",
    request_body = DisposeRequest,
    responses((status = 200, description = "Placements removed", body = DisposeResponse)),
    tag = "stowage"
)]
async fn handle_dispose(
    State(state): State<ApiState>,
    payload: Result<Json<DisposeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection_response(err),
    };

    let mut service = state.service.lock().await;
    match service.dispose(&request.item_ids, request.user_id.as_deref()) {
        Ok(removed) => Json(DisposeResponse {
            success: true,
            removed,
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for POST /waste: flags an item as waste and frees its slot.
#[utoipa::path(
    post,
    path = "/waste",
    request_body = WasteRequest,
    responses(
        (status = 200, description = "Item marked as waste", body = WasteResponse),
        (status = NOT_FOUND, description = "Unknown item", body = ErrorResponse)
    ),
    tag = "stowage"
)]
async fn handle_waste(
    State(state): State<ApiState>,
    payload: Result<Json<WasteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection_response(err),
    };

    let mut service = state.service.lock().await;
    match service.mark_waste(
        &request.item_id,
        &request.reason,
        request.user_id.as_deref(),
    ) {
        Ok(item) => Json(WasteResponse {
            success: true,
            item,
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for GET /api/items: every item with its placement status.
#[utoipa::path(
    get,
    path = "/api/items",
    responses((status = 200, description = "All known items", body = ItemListResponse)),
    tag = "stowage"
)]
async fn handle_list_items(State(state): State<ApiState>) -> Response {
    let service = state.service.lock().await;
    match service.list_items() {
        Ok(items) => Json(ItemListResponse {
            success: true,
            items,
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for GET /api/containers: every container with its fill level.
#[utoipa::path(
    get,
    path = "/api/containers",
    responses((status = 200, description = "All registered containers", body = ContainerListResponse)),
    tag = "stowage"
)]
async fn handle_list_containers(State(state): State<ApiState>) -> Response {
    let service = state.service.lock().await;
    match service.list_containers() {
        Ok(containers) => Json(ContainerListResponse {
            success: true,
            containers,
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

/// Handler for GET /api/logs: filtered action log, newest first.
#[utoipa::path(
    get,
    path = "/api/logs",
    params(
        ("startDate" = Option<u64>, Query, description = "Earliest timestamp, Unix seconds"),
        ("endDate" = Option<u64>, Query, description = "Latest timestamp, Unix seconds"),
        ("itemId" = Option<String>, Query, description = "Only entries for this item"),
        ("userId" = Option<String>, Query, description = "Only entries by this user"),
        ("actionType" = Option<ActionType>, Query, description = "placement, retrieval, rearrangement or disposal")
    ),
    responses(
        (status = 200, description = "Matching entries", body = LogsResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Unknown action type or malformed date", body = ErrorResponse)
    ),
    tag = "stowage"
)]
async fn handle_logs(
    State(state): State<ApiState>,
    query: Result<Query<LogFilter>, QueryRejection>,
) -> Response {
    let Query(filter) = match query {
        Ok(query) => query,
        Err(err) => return rejection_response(err),
    };

    let service = state.service.lock().await;
    match service.logs(&filter) {
        Ok(logs) => Json(LogsResponse {
            success: true,
            logs,
        })
        .into_response(),
        Err(err) => stowage_error_response(err),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
