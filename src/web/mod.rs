//! The HTTP + SSE surface (spec §6 Egress): axum router, shared state, and
//! the bearer/API-key middleware. The core (store, subscriptions, pipeline)
//! consumes none of this — this module only ever calls into their public
//! handles. Mirrors the teacher's `web::build`/`GoatChildState` shape:
//! one `FromRef`-derived state struct, a `ServiceBuilder` layer stack, and a
//! router assembled from per-area `nest`s.

pub mod admin;
pub mod objects;
pub mod subscriptions;

use crate::config::ConfigFile;
use crate::enums::MqttConnectionState;
use crate::error::BridgeError;
use crate::ingest::Pipeline;
use crate::store::ObjectStore;
use crate::subscriptions::SubscriptionManager;
use axum::extract::{FromRef, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use concread::cowcell::asynch::CowCell;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Everything a handler might need, cloned cheaply per request the way the
/// teacher's `GoatChildState` is: every field here is itself a handle
/// (`mpsc` sender, `Arc`, or `watch::Receiver`), never the data itself.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: ObjectStore,
    pub subscriptions: SubscriptionManager,
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<CowCell<ConfigFile>>,
    pub mqtt_state: watch::Receiver<MqttConnectionState>,
    pub mqtt_client: rumqttc::AsyncClient,
}

/// The one error type every handler returns. Maps spec §7's error
/// disposition table onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, message)
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::NotFound(e) => ApiError::new(StatusCode::NOT_FOUND, e),
            BridgeError::Conflict(e) => ApiError::new(StatusCode::CONFLICT, e),
            BridgeError::BadRequest(e) => ApiError::new(StatusCode::BAD_REQUEST, e),
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<regex::Error> for ApiError {
    fn from(error: regex::Error) -> Self {
        ApiError::bad_request(format!("invalid topic pattern: {error}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// `uuid::Uuid::parse_str` with a 400 instead of the bare parse error.
pub(crate) fn parse_subscription_id(raw: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("not a valid subscription id: {raw}")))
}

/// No-op when `config.auth.enabled` is false, matching spec §6's "external
/// to the core" framing — the bridge ships a working check, but the core
/// never depends on it being on.
async fn require_api_key(
    State(state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Response {
    let config = state.config.read().await;
    if !config.auth.enabled {
        drop(config);
        return next.run(request).await;
    }
    let api_keys = config.auth.api_keys.clone();
    drop(config);

    match auth_header {
        Some(TypedHeader(Authorization(bearer))) if api_keys.iter().any(|key| key == bearer.token()) => {
            next.run(request).await
        }
        _ => ApiError::new(StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response(),
    }
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config.read().await;
    let mqtt_state = *state.mqtt_state.borrow();
    let store_stats = state.store.stats().await.unwrap_or_default();
    let pipeline_stats = state.pipeline.stats.snapshot();
    Json(json!({
        "hostname": config.hostname,
        "mqttConnectionState": mqtt_state,
        "store": store_stats,
        "pipeline": pipeline_stats,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        objects::list_namespaces,
        objects::list_object_types,
        objects::list_objects,
        objects::objects_related,
        objects::objects_value,
        subscriptions::create_subscription,
        subscriptions::list_subscriptions,
    ),
    tags(
        (name = "objects", description = "Read-only object graph queries"),
        (name = "subscriptions", description = "Change-notification subscriptions"),
        (name = "admin", description = "Mapping and object type administration"),
    )
)]
struct ApiDoc;

pub fn build(state: AppState) -> Router {
    let protected = Router::new()
        .route("/namespaces", get(objects::list_namespaces))
        .route("/objecttypes", get(objects::list_object_types))
        .route("/objecttypes/query", post(objects::query_object_types))
        .route("/relationshiptypes", get(objects::list_relationship_types))
        .route("/relationshiptypes/query", post(objects::query_relationship_types))
        .route("/objects", get(objects::list_objects))
        .route("/objects/list", post(objects::objects_list))
        .route("/objects/related", post(objects::objects_related))
        .route("/objects/value", post(objects::objects_value))
        .route("/objects/history", post(objects::objects_history))
        .route("/subscriptions", post(subscriptions::create_subscription).get(subscriptions::list_subscriptions))
        .route(
            "/subscriptions/{id}",
            get(subscriptions::get_subscription).delete(subscriptions::delete_subscription),
        )
        .route("/subscriptions/{id}/register", post(subscriptions::register_items))
        .route("/subscriptions/{id}/unregister", post(subscriptions::unregister_items))
        .route("/subscriptions/{id}/stream", get(subscriptions::stream_subscription))
        .route("/subscriptions/{id}/sync", post(subscriptions::sync_subscription))
        .route(
            "/admin/objecttypes",
            post(admin::create_object_type).get(admin::list_object_types_admin),
        )
        .route(
            "/admin/objecttypes/{id}",
            get(admin::get_object_type)
                .put(admin::update_object_type)
                .delete(admin::delete_object_type),
        )
        .route("/admin/mappings", post(admin::create_mapping).get(admin::list_mappings))
        .route(
            "/admin/mappings/{id}",
            get(admin::get_mapping).put(admin::update_mapping).delete(admin::delete_mapping),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/status", get(status))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    ApiError::not_found("no such route")
}
