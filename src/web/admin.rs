//! `Admin: POST/GET/PUT/DELETE /admin/objecttypes[/{id}]` and
//! `/admin/mappings[/{id}]` (spec §6): the only handlers that mutate
//! configuration-shaped state at runtime. Object type deletion is refused
//! with 409 while any instance still references it; mapping creation
//! derives the MQTT subscription filter (each `{x}` replaced with `+`,
//! spec §4.1) and subscribes it through the shared [`rumqttc::AsyncClient`]
//! so newly-added rules start receiving messages without a restart.

use super::{ApiError, AppState};
use crate::model::ObjectType;
use crate::schema_mapper::MappingRule;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rumqttc::QoS;
use serde_json::{json, Value};

pub async fn list_object_types_admin(State(state): State<AppState>) -> Result<Json<Vec<ObjectType>>, ApiError> {
    Ok(Json(state.store.get_all_object_types().await?))
}

pub async fn create_object_type(State(state): State<AppState>, Json(object_type): Json<ObjectType>) -> Result<(StatusCode, Json<ObjectType>), ApiError> {
    if state.store.get_object_type(object_type.element_id.clone()).await?.is_some() {
        return Err(ApiError::conflict(format!("object type {} already exists", object_type.element_id)));
    }
    state.store.register_object_type(object_type.clone()).await?;
    Ok((StatusCode::CREATED, Json(object_type)))
}

pub async fn get_object_type(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ObjectType>, ApiError> {
    state
        .store
        .get_object_type(id.clone())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no such object type: {id}")))
}

pub async fn update_object_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut object_type): Json<ObjectType>,
) -> Result<Json<ObjectType>, ApiError> {
    if state.store.get_object_type(id.clone()).await?.is_none() {
        return Err(ApiError::not_found(format!("no such object type: {id}")));
    }
    object_type.element_id = id;
    state.store.register_object_type(object_type.clone()).await?;
    Ok(Json(object_type))
}

pub async fn delete_object_type(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    match state.store.delete_object_type(id.clone()).await? {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(count) => Err(ApiError::conflict(format!("object type {id} is in use by {count} instance(s)"))),
    }
}

pub async fn list_mappings(State(state): State<AppState>) -> Json<Vec<MappingRule>> {
    Json(state.pipeline.rules())
}

pub async fn create_mapping(State(state): State<AppState>, Json(rule): Json<MappingRule>) -> Result<(StatusCode, Json<Value>), ApiError> {
    if state.pipeline.rules().iter().any(|r| r.id == rule.id) {
        return Err(ApiError::conflict(format!("mapping {} already exists", rule.id)));
    }

    let id = rule.id.clone();
    let mqtt_filter = state.pipeline.add_rule(rule.clone())?;
    state
        .mqtt_client
        .subscribe(&mqtt_filter, QoS::AtLeastOnce)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to subscribe {mqtt_filter}: {e}")))?;

    tracing::info!(mapping = id, filter = mqtt_filter, "created mapping and subscribed");
    Ok((StatusCode::CREATED, Json(json!({ "mapping": rule, "mqttFilter": mqtt_filter }))))
}

pub async fn get_mapping(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MappingRule>, ApiError> {
    state
        .pipeline
        .rules()
        .into_iter()
        .find(|r| r.id == id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no such mapping: {id}")))
}

/// Replaces the rule in place. The prior MQTT subscription (if its topic
/// differs from the new one) is left in place — see `DESIGN.md`'s "stale
/// topic" decision; only the new filter is subscribed here.
pub async fn update_mapping(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut rule): Json<MappingRule>,
) -> Result<Json<Value>, ApiError> {
    if !state.pipeline.remove_rule(&id) {
        return Err(ApiError::not_found(format!("no such mapping: {id}")));
    }
    rule.id = id;
    let mqtt_filter = state.pipeline.add_rule(rule.clone())?;
    state
        .mqtt_client
        .subscribe(&mqtt_filter, QoS::AtLeastOnce)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to subscribe {mqtt_filter}: {e}")))?;
    Ok(Json(json!({ "mapping": rule, "mqttFilter": mqtt_filter })))
}

pub async fn delete_mapping(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if state.pipeline.remove_rule(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no such mapping: {id}")))
    }
}
