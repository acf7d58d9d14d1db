//! The object store actor: a single task owns [`engine::ObjectStoreState`]
//! and serializes every operation through one `mpsc` channel (spec §5's
//! "single coarse-grained exclusion" floor), generalizing the teacher's
//! `datastore::Command`/`manager` pattern from one `Get` variant to the full
//! surface of spec §4.6.

pub mod engine;

use crate::error::BridgeError;
use crate::model::{
    ElementId, Namespace, ObjectInstance, ObjectType, ObjectValue, Relationship, RelationshipType,
};
use engine::{ChangeListener, ListenerId, ObjectStoreState, StoreStats};
use tokio::sync::{mpsc, oneshot};

type Responder<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum Command {
    Upsert { value: ObjectValue, instance: Option<ObjectInstance> },
    Delete { element_id: ElementId, resp: Responder<bool> },
    Clear,

    GetValue { element_id: ElementId, resp: Responder<Option<ObjectValue>> },
    GetValues { element_ids: Vec<ElementId>, resp: Responder<Vec<(ElementId, Option<ObjectValue>)>> },
    GetAllValues { resp: Responder<Vec<ObjectValue>> },

    GetInstance { element_id: ElementId, resp: Responder<Option<ObjectInstance>> },
    GetInstances { element_ids: Vec<ElementId>, resp: Responder<Vec<(ElementId, Option<ObjectInstance>)>> },
    GetAllInstances { resp: Responder<Vec<ObjectInstance>> },
    GetInstancesByNamespace { namespace_uri: String, resp: Responder<Vec<ObjectInstance>> },
    GetInstancesByType { type_id: String, resp: Responder<Vec<ObjectInstance>> },

    RegisterNamespace { namespace: Namespace },
    GetNamespace { uri: String, resp: Responder<Option<Namespace>> },
    GetAllNamespaces { resp: Responder<Vec<Namespace>> },

    RegisterObjectType { object_type: ObjectType },
    GetObjectType { id: String, resp: Responder<Option<ObjectType>> },
    GetAllObjectTypes { resp: Responder<Vec<ObjectType>> },
    GetObjectTypesByNamespace { namespace_uri: String, resp: Responder<Vec<ObjectType>> },
    DeleteObjectType { id: String, resp: Responder<Result<(), usize>> },

    RegisterRelationshipType { relationship_type: RelationshipType },
    GetRelationshipType { id: String, resp: Responder<Option<RelationshipType>> },
    GetAllRelationshipTypes { resp: Responder<Vec<RelationshipType>> },
    GetRelationshipTypesByNamespace { namespace_uri: String, resp: Responder<Vec<RelationshipType>> },

    AddRelationship { source: ElementId, target: ElementId, type_id: String, resp: Responder<bool> },
    AddComponent { parent_id: ElementId, child_id: ElementId },
    GetRelationships { element_id: ElementId, type_id: Option<String>, resp: Responder<Vec<Relationship>> },
    GetRelatedElementIds { element_id: ElementId, type_id: Option<String>, resp: Responder<Vec<ElementId>> },
    GetSourcesForTarget { target_id: ElementId, resp: Responder<Vec<ElementId>> },
    RemoveRelationship { source: ElementId, target: ElementId, type_id: Option<String>, resp: Responder<bool> },
    RemoveRelationshipsByType { element_id: ElementId, type_id: String },
    ClearRelationships { element_id: ElementId },
    GetParentId { element_id: ElementId, resp: Responder<Option<ElementId>> },
    HasChildren { element_id: ElementId, resp: Responder<bool> },

    AddChangeListener { listener: ChangeListener, resp: Responder<ListenerId> },
    RemoveChangeListener { id: ListenerId, resp: Responder<bool> },

    Stats { resp: Responder<StoreStats> },
}

/// Owns the store state exclusively, draining `rx` until every sender is
/// dropped. Mirrors the teacher's `datastore::manager`.
pub async fn manager(mut rx: mpsc::Receiver<Command>) {
    let mut state = ObjectStoreState::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Upsert { value, instance } => state.upsert(value, instance),
            Command::Delete { element_id, resp } => respond(resp, state.delete(&element_id)),
            Command::Clear => state.clear(),

            Command::GetValue { element_id, resp } => respond(resp, state.get_value(&element_id)),
            Command::GetValues { element_ids, resp } => respond(resp, state.get_values(&element_ids)),
            Command::GetAllValues { resp } => respond(resp, state.get_all_values()),

            Command::GetInstance { element_id, resp } => respond(resp, state.get_instance(&element_id)),
            Command::GetInstances { element_ids, resp } => respond(resp, state.get_instances(&element_ids)),
            Command::GetAllInstances { resp } => respond(resp, state.get_all_instances()),
            Command::GetInstancesByNamespace { namespace_uri, resp } => {
                respond(resp, state.get_instances_by_namespace(&namespace_uri))
            }
            Command::GetInstancesByType { type_id, resp } => {
                respond(resp, state.get_instances_by_type(&type_id))
            }

            Command::RegisterNamespace { namespace } => state.register_namespace(namespace),
            Command::GetNamespace { uri, resp } => respond(resp, state.get_namespace(&uri)),
            Command::GetAllNamespaces { resp } => respond(resp, state.get_all_namespaces()),

            Command::RegisterObjectType { object_type } => state.register_object_type(object_type),
            Command::GetObjectType { id, resp } => respond(resp, state.get_object_type(&id)),
            Command::GetAllObjectTypes { resp } => respond(resp, state.get_all_object_types()),
            Command::GetObjectTypesByNamespace { namespace_uri, resp } => {
                respond(resp, state.get_object_types_by_namespace(&namespace_uri))
            }
            Command::DeleteObjectType { id, resp } => respond(resp, state.delete_object_type(&id)),

            Command::RegisterRelationshipType { relationship_type } => {
                state.register_relationship_type(relationship_type)
            }
            Command::GetRelationshipType { id, resp } => respond(resp, state.get_relationship_type(&id)),
            Command::GetAllRelationshipTypes { resp } => respond(resp, state.get_all_relationship_types()),
            Command::GetRelationshipTypesByNamespace { namespace_uri, resp } => {
                respond(resp, state.get_relationship_types_by_namespace(&namespace_uri))
            }

            Command::AddRelationship { source, target, type_id, resp } => {
                respond(resp, state.add_relationship(source, target, type_id))
            }
            Command::AddComponent { parent_id, child_id } => state.add_component(parent_id, child_id),
            Command::GetRelationships { element_id, type_id, resp } => {
                respond(resp, state.get_relationships(&element_id, type_id.as_deref()))
            }
            Command::GetRelatedElementIds { element_id, type_id, resp } => {
                respond(resp, state.get_related_element_ids(&element_id, type_id.as_deref()))
            }
            Command::GetSourcesForTarget { target_id, resp } => {
                respond(resp, state.get_sources_for_target(&target_id))
            }
            Command::RemoveRelationship { source, target, type_id, resp } => {
                respond(resp, state.remove_relationship(&source, &target, type_id.as_deref()))
            }
            Command::RemoveRelationshipsByType { element_id, type_id } => {
                state.remove_relationships_by_type(&element_id, &type_id)
            }
            Command::ClearRelationships { element_id } => state.clear_relationships(&element_id),
            Command::GetParentId { element_id, resp } => respond(resp, state.get_parent_id(&element_id)),
            Command::HasChildren { element_id, resp } => respond(resp, state.has_children(&element_id)),

            Command::AddChangeListener { listener, resp } => {
                respond(resp, state.add_change_listener(listener))
            }
            Command::RemoveChangeListener { id, resp } => respond(resp, state.remove_change_listener(id)),

            Command::Stats { resp } => respond(resp, state.stats()),
        }
    }
}

fn respond<T>(resp: Responder<T>, value: T) {
    // the receiver may have given up (e.g. an HTTP request got cancelled);
    // that is not the store's problem.
    let _ = resp.send(value);
}

/// A cheap, cloneable handle to the store actor. Every method round-trips
/// through the actor's single `mpsc` queue, so callers never touch
/// [`ObjectStoreState`] directly.
#[derive(Clone)]
pub struct ObjectStore {
    tx: mpsc::Sender<Command>,
}

impl ObjectStore {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(manager(rx));
        Self { tx }
    }

    async fn call<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> Result<T, BridgeError> {
        let (resp, recv) = oneshot::channel();
        self.tx.send(build(resp)).await?;
        Ok(recv.await?)
    }

    pub async fn upsert(&self, value: ObjectValue, instance: Option<ObjectInstance>) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::Upsert { value, instance }).await?)
    }

    pub async fn delete(&self, element_id: impl Into<ElementId>) -> Result<bool, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::Delete { element_id, resp }).await
    }

    pub async fn clear(&self) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::Clear).await?)
    }

    pub async fn get_value(&self, element_id: impl Into<ElementId>) -> Result<Option<ObjectValue>, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::GetValue { element_id, resp }).await
    }

    pub async fn get_values(&self, element_ids: Vec<ElementId>) -> Result<Vec<(ElementId, Option<ObjectValue>)>, BridgeError> {
        self.call(|resp| Command::GetValues { element_ids, resp }).await
    }

    pub async fn get_all_values(&self) -> Result<Vec<ObjectValue>, BridgeError> {
        self.call(|resp| Command::GetAllValues { resp }).await
    }

    pub async fn get_instance(&self, element_id: impl Into<ElementId>) -> Result<Option<ObjectInstance>, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::GetInstance { element_id, resp }).await
    }

    pub async fn get_instances(&self, element_ids: Vec<ElementId>) -> Result<Vec<(ElementId, Option<ObjectInstance>)>, BridgeError> {
        self.call(|resp| Command::GetInstances { element_ids, resp }).await
    }

    pub async fn get_all_instances(&self) -> Result<Vec<ObjectInstance>, BridgeError> {
        self.call(|resp| Command::GetAllInstances { resp }).await
    }

    pub async fn get_instances_by_namespace(&self, namespace_uri: impl Into<String>) -> Result<Vec<ObjectInstance>, BridgeError> {
        let namespace_uri = namespace_uri.into();
        self.call(|resp| Command::GetInstancesByNamespace { namespace_uri, resp }).await
    }

    pub async fn get_instances_by_type(&self, type_id: impl Into<String>) -> Result<Vec<ObjectInstance>, BridgeError> {
        let type_id = type_id.into();
        self.call(|resp| Command::GetInstancesByType { type_id, resp }).await
    }

    pub async fn register_namespace(&self, namespace: Namespace) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::RegisterNamespace { namespace }).await?)
    }

    pub async fn get_namespace(&self, uri: impl Into<String>) -> Result<Option<Namespace>, BridgeError> {
        let uri = uri.into();
        self.call(|resp| Command::GetNamespace { uri, resp }).await
    }

    pub async fn get_all_namespaces(&self) -> Result<Vec<Namespace>, BridgeError> {
        self.call(|resp| Command::GetAllNamespaces { resp }).await
    }

    pub async fn register_object_type(&self, object_type: ObjectType) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::RegisterObjectType { object_type }).await?)
    }

    pub async fn get_object_type(&self, id: impl Into<String>) -> Result<Option<ObjectType>, BridgeError> {
        let id = id.into();
        self.call(|resp| Command::GetObjectType { id, resp }).await
    }

    pub async fn get_all_object_types(&self) -> Result<Vec<ObjectType>, BridgeError> {
        self.call(|resp| Command::GetAllObjectTypes { resp }).await
    }

    pub async fn get_object_types_by_namespace(&self, namespace_uri: impl Into<String>) -> Result<Vec<ObjectType>, BridgeError> {
        let namespace_uri = namespace_uri.into();
        self.call(|resp| Command::GetObjectTypesByNamespace { namespace_uri, resp }).await
    }

    pub async fn delete_object_type(&self, id: impl Into<String>) -> Result<Result<(), usize>, BridgeError> {
        let id = id.into();
        self.call(|resp| Command::DeleteObjectType { id, resp }).await
    }

    pub async fn register_relationship_type(&self, relationship_type: RelationshipType) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::RegisterRelationshipType { relationship_type }).await?)
    }

    pub async fn get_relationship_type(&self, id: impl Into<String>) -> Result<Option<RelationshipType>, BridgeError> {
        let id = id.into();
        self.call(|resp| Command::GetRelationshipType { id, resp }).await
    }

    pub async fn get_all_relationship_types(&self) -> Result<Vec<RelationshipType>, BridgeError> {
        self.call(|resp| Command::GetAllRelationshipTypes { resp }).await
    }

    pub async fn get_relationship_types_by_namespace(&self, namespace_uri: impl Into<String>) -> Result<Vec<RelationshipType>, BridgeError> {
        let namespace_uri = namespace_uri.into();
        self.call(|resp| Command::GetRelationshipTypesByNamespace { namespace_uri, resp }).await
    }

    pub async fn add_relationship(&self, source: impl Into<ElementId>, target: impl Into<ElementId>, type_id: impl Into<String>) -> Result<bool, BridgeError> {
        let (source, target, type_id) = (source.into(), target.into(), type_id.into());
        self.call(|resp| Command::AddRelationship { source, target, type_id, resp }).await
    }

    pub async fn add_component(&self, parent_id: impl Into<ElementId>, child_id: impl Into<ElementId>) -> Result<(), BridgeError> {
        let (parent_id, child_id) = (parent_id.into(), child_id.into());
        Ok(self.tx.send(Command::AddComponent { parent_id, child_id }).await?)
    }

    pub async fn get_relationships(&self, element_id: impl Into<ElementId>, type_id: Option<String>) -> Result<Vec<Relationship>, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::GetRelationships { element_id, type_id, resp }).await
    }

    pub async fn get_related_element_ids(&self, element_id: impl Into<ElementId>, type_id: Option<String>) -> Result<Vec<ElementId>, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::GetRelatedElementIds { element_id, type_id, resp }).await
    }

    pub async fn get_sources_for_target(&self, target_id: impl Into<ElementId>) -> Result<Vec<ElementId>, BridgeError> {
        let target_id = target_id.into();
        self.call(|resp| Command::GetSourcesForTarget { target_id, resp }).await
    }

    pub async fn remove_relationship(&self, source: impl Into<ElementId>, target: impl Into<ElementId>, type_id: Option<String>) -> Result<bool, BridgeError> {
        let (source, target) = (source.into(), target.into());
        self.call(|resp| Command::RemoveRelationship { source, target, type_id, resp }).await
    }

    pub async fn remove_relationships_by_type(&self, element_id: impl Into<ElementId>, type_id: impl Into<String>) -> Result<(), BridgeError> {
        let (element_id, type_id) = (element_id.into(), type_id.into());
        Ok(self.tx.send(Command::RemoveRelationshipsByType { element_id, type_id }).await?)
    }

    pub async fn clear_relationships(&self, element_id: impl Into<ElementId>) -> Result<(), BridgeError> {
        let element_id = element_id.into();
        Ok(self.tx.send(Command::ClearRelationships { element_id }).await?)
    }

    pub async fn get_parent_id(&self, element_id: impl Into<ElementId>) -> Result<Option<ElementId>, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::GetParentId { element_id, resp }).await
    }

    pub async fn has_children(&self, element_id: impl Into<ElementId>) -> Result<bool, BridgeError> {
        let element_id = element_id.into();
        self.call(|resp| Command::HasChildren { element_id, resp }).await
    }

    pub async fn add_change_listener(&self, listener: ChangeListener) -> Result<ListenerId, BridgeError> {
        self.call(|resp| Command::AddChangeListener { listener, resp }).await
    }

    pub async fn remove_change_listener(&self, id: ListenerId) -> Result<bool, BridgeError> {
        self.call(|resp| Command::RemoveChangeListener { id, resp }).await
    }

    pub async fn stats(&self) -> Result<StoreStats, BridgeError> {
        self.call(|resp| Command::Stats { resp }).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ObjectInstance;
    use crate::value::Value;
    use chrono::Utc;

    #[tokio::test]
    async fn actor_round_trips_upsert_and_get() {
        let store = ObjectStore::spawn();
        let instance = ObjectInstance {
            element_id: "a.b".to_string(),
            display_name: "B".to_string(),
            type_id: "GenericTag".to_string(),
            namespace_uri: "urn:x".to_string(),
            is_composition: false,
        };
        store
            .upsert(ObjectValue::new("a.b", Value::Number(3.0), Utc::now()), Some(instance))
            .await
            .unwrap();

        let value = store.get_value("a.b").await.unwrap().unwrap();
        assert_eq!(value.value, Value::Number(3.0));
        assert!(store.has_children("a").await.unwrap());
    }

    #[tokio::test]
    async fn change_listener_receives_notification() {
        let store = ObjectStore::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store
            .add_change_listener(Box::new(move |id, value, _| {
                let _ = tx.send((id.clone(), value.clone()));
            }))
            .await
            .unwrap();

        store
            .upsert(ObjectValue::new("leaf", Value::Bool(true), Utc::now()), None)
            .await
            .unwrap();

        let (id, value) = rx.recv().await.expect("notification delivered");
        assert_eq!(id, "leaf");
        assert_eq!(value.value, Value::Bool(true));
    }
}
