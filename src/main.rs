mod catalog;
mod config;
mod export;
mod http;
mod jobs;
mod metrics;
mod mockups;
mod models;
mod pipeline;
mod security;
mod storage;
mod store;
mod supabase;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use config::AppConfig;
use export::{ExportFilter, parse_bound};
use jobs::{RenderJobState, WorkflowInfo, WorkflowRegistry};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mockups::{OnDemandRender, WorkflowView};
use models::{
    ApiError, CatalogDraft, CatalogRecord, GeneratedDraft, GeneratedProduct, RecordId, Role,
};
use pipeline::{Catalog, PipelineError, PipelineErrorKind, TemplateListing, WorkflowRequest};
use security::{OperatorAuth, require_header_key, require_operator};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use store::ListFilter;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "catalog.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    let operator_key = config
        .operator_key
        .clone()
        .ok_or_else(|| eyre::eyre!("missing required configuration `OPERATOR_API_KEY`"))?;
    let catalog = Catalog::from_config(&config)?;
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}));

    let state = AppState {
        catalog,
        workflows: WorkflowRegistry::new(config.workflow_idle),
        openapi: Arc::new(openapi),
        prometheus_handle,
    };
    let app = router(state, OperatorAuth::new(operator_key));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "catalog.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    catalog: Catalog,
    workflows: WorkflowRegistry,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState, auth: OperatorAuth) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/generated", get(list_generated))
        .route(
            "/generated/{id}",
            get(get_generated)
                .put(update_generated)
                .delete(delete_generated),
        )
        .route("/export", get(export_csv))
        .route("/templates", get(list_templates))
        .route("/colors", get(list_colors))
        .route("/workflows", post(start_workflow))
        .route(
            "/workflows/{id}",
            get(get_workflow).delete(discard_workflow),
        )
        .route("/workflows/{id}/render", post(render_workflow))
        .route("/workflows/{id}/render_one", post(render_one))
        .route("/workflows/{id}/persist", post(persist_workflow))
        .route_layer(middleware::from_fn_with_state(auth, require_operator));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mockup-catalog-rs",
    }))
}

async fn openapi_json(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let expected = std::env::var("OPENAPI_KEY").ok();
    if let Err(rejected) = require_header_key(&headers, "X-Docs-Key", expected.as_deref()) {
        return rejected;
    }
    Json((*state.openapi).clone()).into_response()
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Mockup Catalog API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(16 * 1024 * 1024)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let expected = std::env::var("METRICS_KEY").ok();
    if let Err(rejected) = require_header_key(&headers, "X-Metrics-Key", expected.as_deref()) {
        return rejected;
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct WindowQuery {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

impl WindowQuery {
    fn filter(&self) -> Result<ListFilter, AppError> {
        Ok(ListFilter {
            created_from: date_bound("from", self.from.as_deref(), false)?,
            created_to: date_bound("to", self.to.as_deref(), true)?,
        })
    }
}

fn date_bound(
    name: &'static str,
    raw: Option<&str>,
    end_of_day: bool,
) -> Result<Option<DateTime<Utc>>, AppError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_bound(value, end_of_day).map(Some).ok_or_else(|| {
            PipelineError::invalid_input("query", format!("`{name}` is not a date: {value}")).into()
        }),
    }
}

/// List catalog products, newest first.
///
/// - Method: `GET`
/// - Path: `/products?from=&to=`
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<CatalogRecord>>, AppError> {
    crate::metrics::inc_requests("/products");
    let filter = query.filter()?;
    Ok(Json(state.catalog.list_products(&filter).await?))
}

/// Create a catalog product. Blank `item_sku` and size SKUs are generated.
async fn create_product(
    State(state): State<AppState>,
    Json(draft): Json<CatalogDraft>,
) -> Result<(StatusCode, Json<CatalogRecord>), AppError> {
    crate::metrics::inc_requests("/products");
    let record = state.catalog.create_product(draft).await?;
    info!(target = "catalog.api", id = record.id, sku = %record.item_sku, "product_created");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<CatalogRecord>, AppError> {
    crate::metrics::inc_requests("/products/{id}");
    Ok(Json(state.catalog.get_product(id).await?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(draft): Json<CatalogDraft>,
) -> Result<Json<CatalogRecord>, AppError> {
    crate::metrics::inc_requests("/products/{id}");
    Ok(Json(state.catalog.update_product(id, draft).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/products/{id}");
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_generated(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<GeneratedProduct>>, AppError> {
    crate::metrics::inc_requests("/generated");
    let filter = query.filter()?;
    Ok(Json(state.catalog.list_generated(&filter).await?))
}

async fn get_generated(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<GeneratedProduct>, AppError> {
    crate::metrics::inc_requests("/generated/{id}");
    Ok(Json(state.catalog.get_generated(id).await?))
}

async fn update_generated(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(draft): Json<GeneratedDraft>,
) -> Result<Json<GeneratedProduct>, AppError> {
    crate::metrics::inc_requests("/generated/{id}");
    Ok(Json(state.catalog.update_generated(id, draft).await?))
}

async fn delete_generated(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/generated/{id}");
    state.catalog.delete_generated(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct ExportQuery {
    /// `parent`, `child` or `all`.
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(flatten)]
    window: WindowQuery,
}

impl ExportQuery {
    fn filter(&self) -> Result<ExportFilter, AppError> {
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) if value.eq_ignore_ascii_case("all") => None,
            Some(value) => Some(Role::from_str(value).ok_or_else(|| {
                AppError::from(PipelineError::invalid_input(
                    "query",
                    format!("unknown kind `{value}`"),
                ))
            })?),
        };
        let window = self.window.filter()?;
        Ok(ExportFilter {
            kind,
            category: self
                .category
                .clone()
                .filter(|category| !category.trim().is_empty()),
            created_from: window.created_from,
            created_to: window.created_to,
        })
    }
}

/// Download the marketplace CSV.
///
/// - Method: `GET`
/// - Path: `/export?kind=&category=&from=&to=`
/// - Response: `text/csv` attachment named `product_export_<timestamp>.csv`
async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/export");
    let filter = query.filter()?;
    let file = state.catalog.export(&filter).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE.as_str(), "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION.as_str(), disposition),
            ("X-Row-Count", file.row_count.to_string()),
        ],
        file.bytes,
    )
        .into_response())
}

async fn list_templates(State(state): State<AppState>) -> Json<TemplateListing> {
    crate::metrics::inc_requests("/templates");
    Json(state.catalog.templates().await)
}

#[derive(Debug, Serialize)]
struct ColorOption {
    name: &'static str,
    hex: &'static str,
}

/// The colour choices offered when generating mockups.
async fn list_colors() -> Json<Vec<ColorOption>> {
    Json(
        catalog::color::palette()
            .iter()
            .map(|&(name, hex)| ColorOption { name, hex })
            .collect(),
    )
}

/// Upload a design and open a mockup workflow.
///
/// - Method: `POST`
/// - Path: `/workflows`
/// - Body: `WorkflowRequest` (design as base64 or a data URL)
/// - Response: `WorkflowInfo` with the uploaded source URL and design SKU
async fn start_workflow(
    State(state): State<AppState>,
    Json(request): Json<WorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowInfo>), AppError> {
    crate::metrics::inc_requests("/workflows");
    let workflow = state.catalog.start_workflow(request).await?;
    let info = state.workflows.insert(workflow).await;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowInfo>, AppError> {
    crate::metrics::inc_requests("/workflows/{id}");
    state
        .workflows
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| workflow_not_found(id))
}

/// Cancels any in-flight render and forgets the workflow. Uploaded objects
/// stay in storage.
async fn discard_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/workflows/{id}");
    if state.workflows.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(workflow_not_found(id))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RenderQuery {
    /// Block until the batch finishes instead of answering 202 immediately.
    #[serde(default)]
    wait: bool,
}

/// Render every template × colour pair in the background.
///
/// - Method: `POST`
/// - Path: `/workflows/{id}/render?wait=false`
/// - Response: 202 with the running state, or 200 with the final state when
///   `wait=true`. Progress is visible on `GET /workflows/{id}`.
async fn render_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RenderQuery>,
) -> Result<(StatusCode, Json<WorkflowInfo>), AppError> {
    crate::metrics::inc_requests("/workflows/{id}/render");
    let (running, handle) = state
        .workflows
        .spawn_render(state.catalog.clone(), id)
        .await?;
    if !query.wait {
        return Ok((
            StatusCode::ACCEPTED,
            Json(WorkflowInfo {
                id,
                render: running,
                workflow: None,
            }),
        ));
    }
    handle
        .await
        .map_err(|err| PipelineError::internal("render_all", err.to_string()))?;
    let info = state
        .workflows
        .get(id)
        .await
        .ok_or_else(|| workflow_not_found(id))?;
    if let RenderJobState::Failed { error, .. } = &info.render {
        return Err(PipelineError::render("render_all", error.clone()).into());
    }
    Ok((StatusCode::OK, Json(info)))
}

#[derive(Debug, Deserialize)]
struct RenderOneRequest {
    /// Colour name or hex.
    color: String,
    #[serde(default)]
    template: Option<String>,
    /// Display slot whose colour this render replaces.
    #[serde(default)]
    slot: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RenderOneResponse {
    render: OnDemandRender,
    workflow: WorkflowView,
}

async fn render_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenderOneRequest>,
) -> Result<Json<RenderOneResponse>, AppError> {
    crate::metrics::inc_requests("/workflows/{id}/render_one");
    let catalog = state.catalog.clone();
    let response = state
        .workflows
        .with_workflow(id, |mut workflow| async move {
            let render = catalog
                .render_on_demand(
                    &mut workflow,
                    &request.color,
                    request.template.as_deref(),
                    request.slot,
                )
                .await?;
            Ok(RenderOneResponse {
                render,
                workflow: workflow.view(),
            })
        })
        .await?;
    Ok(Json(response))
}

/// Save every cached render durably and record the generated product.
async fn persist_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<GeneratedProduct>), AppError> {
    crate::metrics::inc_requests("/workflows/{id}/persist");
    let catalog = state.catalog.clone();
    let product = state
        .workflows
        .with_workflow(id, |mut workflow| async move {
            catalog.persist(&mut workflow).await
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

fn workflow_not_found(id: Uuid) -> AppError {
    PipelineError::not_found("workflow", format!("workflow {id} not found")).into()
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::NotFound => StatusCode::NOT_FOUND,
                    PipelineErrorKind::Upload
                    | PipelineErrorKind::Render
                    | PipelineErrorKind::Store => StatusCode::BAD_GATEWAY,
                    PipelineErrorKind::Configuration
                    | PipelineErrorKind::Persist
                    | PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(target = "catalog.api", stage = err.stage(), error = %err, "request_failed");
                }
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
