//! `GET /namespaces`, `/objecttypes`, `/relationshiptypes`, `/objects*`
//! (spec §6 Egress, read-only half). Every handler is a thin translation
//! from an [`ObjectStore`] call to the wire shape spec §6's table names.

use super::{AppState, ApiError};
use crate::model::{ElementId, ObjectInstance, HAS_COMPONENT};
use crate::store::ObjectStore;
use axum::extract::{Query, State};
use axum::Json;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ElementIdsRequest {
    #[serde(default)]
    pub element_ids: Vec<ElementId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceFilter {
    #[serde(default)]
    namespace_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectsFilter {
    #[serde(default)]
    namespace_uri: Option<String>,
    #[serde(default)]
    type_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedRequest {
    element_id: ElementId,
    #[serde(default)]
    relationship_type_id: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRequest {
    element_ids: Vec<ElementId>,
    #[serde(default)]
    max_depth: Option<u32>,
}

/// The `{elementId, displayName, typeId, parentId, hasChildren, isComposition,
/// namespaceUri}` shape spec §6 uses for every `/objects*` listing endpoint.
async fn instance_to_summary(store: &ObjectStore, instance: &ObjectInstance) -> Result<Value, ApiError> {
    let parent_id = store.get_parent_id(instance.element_id.clone()).await?;
    let has_children = store.has_children(instance.element_id.clone()).await?;
    Ok(json!({
        "elementId": instance.element_id,
        "displayName": instance.display_name,
        "typeId": instance.type_id,
        "parentId": parent_id,
        "hasChildren": has_children,
        "isComposition": instance.is_composition,
        "namespaceUri": instance.namespace_uri,
    }))
}

#[utoipa::path(get, path = "/namespaces", tag = "objects", responses((status = 200, description = "Registered namespaces")))]
pub async fn list_namespaces(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let namespaces = state.store.get_all_namespaces().await?;
    Ok(Json(json!({ "namespaces": namespaces })))
}

#[utoipa::path(get, path = "/objecttypes", tag = "objects", responses((status = 200, description = "Registered object types")))]
pub async fn list_object_types(State(state): State<AppState>, Query(filter): Query<NamespaceFilter>) -> Result<Json<Value>, ApiError> {
    let object_types = match filter.namespace_uri {
        Some(ns) => state.store.get_object_types_by_namespace(ns).await?,
        None => state.store.get_all_object_types().await?,
    };
    Ok(Json(json!({ "objectTypes": object_types })))
}

pub async fn query_object_types(State(state): State<AppState>, Json(req): Json<ElementIdsRequest>) -> Result<Json<Value>, ApiError> {
    let mut object_types = Vec::new();
    for id in req.element_ids {
        if let Some(object_type) = state.store.get_object_type(id).await? {
            object_types.push(object_type);
        }
    }
    Ok(Json(json!({ "objectTypes": object_types })))
}

pub async fn list_relationship_types(State(state): State<AppState>, Query(filter): Query<NamespaceFilter>) -> Result<Json<Value>, ApiError> {
    let relationship_types = match filter.namespace_uri {
        Some(ns) => state.store.get_relationship_types_by_namespace(ns).await?,
        None => state.store.get_all_relationship_types().await?,
    };
    Ok(Json(json!({ "relationshipTypes": relationship_types })))
}

pub async fn query_relationship_types(State(state): State<AppState>, Json(req): Json<ElementIdsRequest>) -> Result<Json<Value>, ApiError> {
    let mut relationship_types = Vec::new();
    for id in req.element_ids {
        if let Some(relationship_type) = state.store.get_relationship_type(id).await? {
            relationship_types.push(relationship_type);
        }
    }
    Ok(Json(json!({ "relationshipTypes": relationship_types })))
}

#[utoipa::path(get, path = "/objects", tag = "objects", responses((status = 200, description = "Objects matching the filter")))]
pub async fn list_objects(State(state): State<AppState>, Query(filter): Query<ObjectsFilter>) -> Result<Json<Vec<Value>>, ApiError> {
    let instances = match (filter.namespace_uri, filter.type_id) {
        (Some(ns), Some(type_id)) => state
            .store
            .get_instances_by_namespace(ns)
            .await?
            .into_iter()
            .filter(|i| i.type_id == type_id)
            .collect(),
        (Some(ns), None) => state.store.get_instances_by_namespace(ns).await?,
        (None, Some(type_id)) => state.store.get_instances_by_type(type_id).await?,
        (None, None) => state.store.get_all_instances().await?,
    };

    let mut summaries = Vec::with_capacity(instances.len());
    for instance in &instances {
        summaries.push(instance_to_summary(&state.store, instance).await?);
    }
    Ok(Json(summaries))
}

/// `POST /objects/list`: same wire shape as [`list_objects`], but a batch
/// fetch by id — unknown ids come back as `null` (spec §7's "unknown
/// elementId" row).
pub async fn objects_list(State(state): State<AppState>, Json(req): Json<ElementIdsRequest>) -> Result<Json<Vec<Option<Value>>>, ApiError> {
    let pairs = state.store.get_instances(req.element_ids).await?;
    let mut out = Vec::with_capacity(pairs.len());
    for (_id, instance) in pairs {
        match instance {
            Some(instance) => out.push(Some(instance_to_summary(&state.store, &instance).await?)),
            None => out.push(None),
        }
    }
    Ok(Json(out))
}

/// `POST /objects/related`: cycle-safe BFS over [`Relationship`] edges.
/// `depth=0` (the default when omitted) means direct neighbors only; a
/// larger `depth` widens the traversal by that many additional hops.
#[utoipa::path(post, path = "/objects/related", tag = "objects", responses((status = 200, description = "Related objects within depth")))]
pub async fn objects_related(State(state): State<AppState>, Json(req): Json<RelatedRequest>) -> Result<Json<Vec<Value>>, ApiError> {
    let hops = match req.depth {
        None | Some(0) => 1,
        Some(n) => n,
    };

    let mut visited: HashSet<ElementId> = HashSet::new();
    visited.insert(req.element_id.clone());
    let mut frontier = vec![req.element_id.clone()];

    for _ in 0..hops {
        let mut next_frontier = Vec::new();
        for id in &frontier {
            let related = state
                .store
                .get_related_element_ids(id.clone(), req.relationship_type_id.clone())
                .await?;
            for related_id in related {
                if visited.insert(related_id.clone()) {
                    next_frontier.push(related_id);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }
    visited.remove(&req.element_id);

    let mut results = Vec::with_capacity(visited.len());
    for id in visited {
        if req.include_metadata {
            if let Some(instance) = state.store.get_instance(id).await? {
                results.push(instance_to_summary(&state.store, &instance).await?);
            }
        } else {
            results.push(json!({ "elementId": id }));
        }
    }
    Ok(Json(results))
}

/// `POST /objects/value`: last-known value plus the composition tree
/// (spec §6). `maxDepth` defaults to `1` (direct `HasComponent` children
/// only); `0` means unlimited recursion; any other `N` walks `N` levels.
#[utoipa::path(post, path = "/objects/value", tag = "objects", responses((status = 200, description = "Values and composition tree")))]
pub async fn objects_value(State(state): State<AppState>, Json(req): Json<ValueRequest>) -> Result<Json<HashMap<ElementId, Option<Value>>>, ApiError> {
    let depth_left = match req.max_depth {
        None => Some(1),
        Some(0) => None,
        Some(n) => Some(n),
    };

    let mut out = HashMap::with_capacity(req.element_ids.len());
    for id in req.element_ids {
        let node = build_value_node(&state.store, id.clone(), depth_left).await?;
        out.insert(id, node);
    }
    Ok(Json(out))
}

fn build_value_node(
    store: &ObjectStore,
    id: ElementId,
    depth_left: Option<u32>,
) -> BoxFuture<'_, Result<Option<Value>, ApiError>> {
    Box::pin(async move {
        let Some(value) = store.get_value(id.clone()).await? else {
            return Ok(None);
        };

        let mut node = Map::new();
        node.insert(
            "data".to_string(),
            json!([{
                "value": Value::from(value.value),
                "quality": value.quality,
                "timestamp": value.timestamp,
            }]),
        );

        if depth_left != Some(0) {
            let children = store.get_related_element_ids(id, Some(HAS_COMPONENT.to_string())).await?;
            for child_id in children {
                let next_depth = depth_left.map(|d| d - 1);
                let child_node = build_value_node(store, child_id.clone(), next_depth).await?;
                node.insert(child_id, child_node.unwrap_or(Value::Null));
            }
        }

        Ok(Some(Value::Object(node)))
    })
}

/// `POST /objects/history`: out of scope for this bridge (spec §6).
pub async fn objects_history() -> ApiError {
    ApiError::not_implemented("history is not implemented")
}
