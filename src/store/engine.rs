//! The pure, synchronous object-graph logic (spec §4.6). No async, no I/O —
//! this is the part of the store that is unit-testable without tokio; the
//! actor in [`super`] is just a thin async shell around one of these.

use crate::model::{
    parent_of, ElementId, Namespace, ObjectInstance, ObjectType, ObjectValue, Relationship,
    RelationshipType, COMPONENT_OF, HAS_CHILDREN, HAS_COMPONENT, HAS_PARENT,
    PLACEHOLDER_QUALITY, PLACEHOLDER_TYPE_ID,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type ListenerId = u64;
pub type ChangeListener = Box<dyn Fn(&ElementId, &ObjectValue, Option<&ObjectInstance>) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub values: usize,
    pub instances: usize,
    pub object_types: usize,
    pub namespaces: usize,
    pub relationship_types: usize,
    pub total_edges: usize,
}

#[derive(Default)]
pub struct ObjectStoreState {
    values: HashMap<ElementId, ObjectValue>,
    instances: HashMap<ElementId, ObjectInstance>,
    namespace_index: HashMap<String, HashSet<ElementId>>,
    type_index: HashMap<String, HashSet<ElementId>>,

    namespaces: HashMap<String, Namespace>,
    object_types: HashMap<ElementId, ObjectType>,
    relationship_types: HashMap<ElementId, RelationshipType>,

    /// source -> edges, insertion order preserved (spec's "Ordering & tie-breaks").
    relationships: HashMap<ElementId, Vec<Relationship>>,
    /// target -> sources, the O(1) reverse lookup spec §4.6 calls for.
    target_index: HashMap<ElementId, HashSet<ElementId>>,

    listeners: BTreeMap<ListenerId, ChangeListener>,
    next_listener_id: ListenerId,
}

impl ObjectStoreState {
    /// Seeds the four built-in relationship types (spec §3).
    pub fn new() -> Self {
        let mut state = Self::default();
        for rt in RelationshipType::builtins() {
            state.relationship_types.insert(rt.element_id.clone(), rt);
        }
        state
    }

    // -- values / instances -------------------------------------------------

    /// Applies the spec §4.6 upsert algorithm. Returns the listener-visible
    /// `(elementId, value, instance)` tuple so the caller (the actor) can log
    /// or otherwise observe what was committed, though notification already
    /// happened inside this call.
    pub fn upsert(&mut self, value: ObjectValue, instance: Option<ObjectInstance>) {
        let element_id = value.element_id.clone();
        self.values.insert(element_id.clone(), value.clone());

        if let Some(instance) = instance {
            self.install_instance(&element_id, instance.clone());

            if let Some(parent_id) = parent_of(&element_id) {
                self.ensure_parent_exists(&parent_id, &instance.namespace_uri);

                // A rename-by-upsert may point this element at a different
                // parent than before; drop the stale HasParent edge *and*
                // its HasChildren inverse so I1 keeps holding.
                let old_parents = self.get_related_element_ids(&element_id, Some(HAS_PARENT));
                self.remove_relationships_by_type(&element_id, HAS_PARENT);
                for old_parent in old_parents {
                    if old_parent != parent_id {
                        self.remove_relationship(&old_parent, &element_id, Some(HAS_CHILDREN));
                    }
                }

                self.add_relationship(element_id.clone(), parent_id.clone(), HAS_PARENT.to_string());
                self.add_relationship(parent_id, element_id.clone(), HAS_CHILDREN.to_string());
            }
        }

        self.notify_listeners(&element_id, &value);
    }

    fn install_instance(&mut self, element_id: &str, instance: ObjectInstance) {
        if let Some(prev) = self.instances.get(element_id) {
            if let Some(set) = self.namespace_index.get_mut(&prev.namespace_uri) {
                set.remove(element_id);
            }
            if let Some(set) = self.type_index.get_mut(&prev.type_id) {
                set.remove(element_id);
            }
        }
        self.namespace_index
            .entry(instance.namespace_uri.clone())
            .or_default()
            .insert(element_id.to_string());
        self.type_index
            .entry(instance.type_id.clone())
            .or_default()
            .insert(element_id.to_string());
        self.instances.insert(element_id.to_string(), instance);
    }

    /// Recursively materializes `Placeholder` ancestors along the dot chain
    /// (spec §4.6, invariant I2) until an existing instance is found.
    fn ensure_parent_exists(&mut self, id: &str, namespace_uri: &str) {
        if self.instances.contains_key(id) {
            return;
        }
        let placeholder = ObjectInstance::placeholder(id, namespace_uri);
        self.install_instance(id, placeholder);
        self.values.insert(
            id.to_string(),
            ObjectValue {
                element_id: id.to_string(),
                value: crate::value::Value::Null,
                timestamp: Utc::now(),
                quality: Some(PLACEHOLDER_QUALITY.to_string()),
            },
        );

        if let Some(parent_id) = parent_of(id) {
            self.ensure_parent_exists(&parent_id, namespace_uri);
            self.add_relationship(id.to_string(), parent_id.clone(), HAS_PARENT.to_string());
            self.add_relationship(parent_id, id.to_string(), HAS_CHILDREN.to_string());
        }
    }

    pub fn get_value(&self, element_id: &str) -> Option<ObjectValue> {
        self.values.get(element_id).cloned()
    }

    pub fn get_values(&self, element_ids: &[ElementId]) -> Vec<(ElementId, Option<ObjectValue>)> {
        element_ids
            .iter()
            .map(|id| (id.clone(), self.get_value(id)))
            .collect()
    }

    pub fn get_all_values(&self) -> Vec<ObjectValue> {
        self.values.values().cloned().collect()
    }

    pub fn get_instance(&self, element_id: &str) -> Option<ObjectInstance> {
        self.instances.get(element_id).cloned()
    }

    pub fn get_instances(&self, element_ids: &[ElementId]) -> Vec<(ElementId, Option<ObjectInstance>)> {
        element_ids
            .iter()
            .map(|id| (id.clone(), self.get_instance(id)))
            .collect()
    }

    pub fn get_all_instances(&self) -> Vec<ObjectInstance> {
        self.instances.values().cloned().collect()
    }

    pub fn get_instances_by_namespace(&self, namespace_uri: &str) -> Vec<ObjectInstance> {
        self.namespace_index
            .get(namespace_uri)
            .into_iter()
            .flatten()
            .filter_map(|id| self.instances.get(id).cloned())
            .collect()
    }

    pub fn get_instances_by_type(&self, type_id: &str) -> Vec<ObjectInstance> {
        self.type_index
            .get(type_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.instances.get(id).cloned())
            .collect()
    }

    /// Cascade-deletes `element_id` (spec §4.6). Returns whether anything
    /// was actually present.
    pub fn delete(&mut self, element_id: &str) -> bool {
        let had_value = self.values.remove(element_id).is_some();
        let had_instance = self.instances.remove(element_id).is_some();
        self.namespace_index.retain(|_, set| {
            set.remove(element_id);
            true
        });
        self.type_index.retain(|_, set| {
            set.remove(element_id);
            true
        });
        self.clear_relationships(element_id);
        had_value || had_instance
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.instances.clear();
        self.namespace_index.clear();
        self.type_index.clear();
        self.relationships.clear();
        self.target_index.clear();
    }

    // -- registries -----------------------------------------------------

    pub fn register_namespace(&mut self, ns: Namespace) {
        self.namespaces.insert(ns.uri.clone(), ns);
    }

    pub fn get_namespace(&self, uri: &str) -> Option<Namespace> {
        self.namespaces.get(uri).cloned()
    }

    pub fn get_all_namespaces(&self) -> Vec<Namespace> {
        self.namespaces.values().cloned().collect()
    }

    pub fn register_object_type(&mut self, ty: ObjectType) {
        self.object_types.insert(ty.element_id.clone(), ty);
    }

    pub fn get_object_type(&self, id: &str) -> Option<ObjectType> {
        self.object_types.get(id).cloned()
    }

    pub fn get_all_object_types(&self) -> Vec<ObjectType> {
        self.object_types.values().cloned().collect()
    }

    pub fn get_object_types_by_namespace(&self, namespace_uri: &str) -> Vec<ObjectType> {
        self.object_types
            .values()
            .filter(|t| t.namespace_uri == namespace_uri)
            .cloned()
            .collect()
    }

    /// `None` on success; `Some(in-use-count)` when instances still
    /// reference the type (caller turns this into a 409, spec §7).
    pub fn delete_object_type(&mut self, id: &str) -> Result<(), usize> {
        let in_use = self.type_index.get(id).map(HashSet::len).unwrap_or(0);
        if in_use > 0 {
            return Err(in_use);
        }
        self.object_types.remove(id);
        Ok(())
    }

    pub fn register_relationship_type(&mut self, rt: RelationshipType) {
        self.relationship_types.insert(rt.element_id.clone(), rt);
    }

    pub fn get_relationship_type(&self, id: &str) -> Option<RelationshipType> {
        self.relationship_types.get(id).cloned()
    }

    pub fn get_all_relationship_types(&self) -> Vec<RelationshipType> {
        self.relationship_types.values().cloned().collect()
    }

    pub fn get_relationship_types_by_namespace(&self, namespace_uri: &str) -> Vec<RelationshipType> {
        self.relationship_types
            .values()
            .filter(|t| t.namespace_uri == namespace_uri)
            .cloned()
            .collect()
    }

    // -- relationships ----------------------------------------------------

    /// Idempotent: adding the same `(source, target, type)` triple twice is
    /// a no-op (spec P7). Returns whether a new edge was actually added.
    pub fn add_relationship(&mut self, source: ElementId, target: ElementId, type_id: String) -> bool {
        let edges = self.relationships.entry(source.clone()).or_default();
        if edges.iter().any(|e| e.target == target && e.type_id == type_id) {
            return false;
        }
        edges.push(Relationship::new(source.clone(), target.clone(), type_id));
        self.target_index.entry(target).or_default().insert(source);
        true
    }

    pub fn get_relationships(&self, element_id: &str, type_id: Option<&str>) -> Vec<Relationship> {
        self.relationships
            .get(element_id)
            .into_iter()
            .flatten()
            .filter(|e| type_id.is_none_or(|t| e.type_id == t))
            .cloned()
            .collect()
    }

    pub fn get_related_element_ids(&self, element_id: &str, type_id: Option<&str>) -> Vec<ElementId> {
        self.get_relationships(element_id, type_id)
            .into_iter()
            .map(|e| e.target)
            .collect()
    }

    /// O(1) reverse lookup: every source with an edge (of any type)
    /// pointing at `target_id`.
    pub fn get_sources_for_target(&self, target_id: &str) -> Vec<ElementId> {
        self.target_index
            .get(target_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove_relationship(&mut self, source: &str, target: &str, type_id: Option<&str>) -> bool {
        let Some(edges) = self.relationships.get_mut(source) else {
            return false;
        };
        let before = edges.len();
        edges.retain(|e| !(e.target == target && type_id.is_none_or(|t| e.type_id == t)));
        let removed = edges.len() != before;
        let now_empty = edges.is_empty();

        if removed {
            let still_points_to_target = self
                .relationships
                .get(source)
                .map(|edges| edges.iter().any(|e| e.target == target))
                .unwrap_or(false);
            if !still_points_to_target {
                if let Some(set) = self.target_index.get_mut(target) {
                    set.remove(source);
                    if set.is_empty() {
                        self.target_index.remove(target);
                    }
                }
            }
        }
        if now_empty {
            self.relationships.remove(source);
        }
        removed
    }

    pub fn remove_relationships_by_type(&mut self, element_id: &str, type_id: &str) {
        let targets: Vec<ElementId> = self
            .relationships
            .get(element_id)
            .into_iter()
            .flatten()
            .filter(|e| e.type_id == type_id)
            .map(|e| e.target.clone())
            .collect();
        for target in targets {
            self.remove_relationship(element_id, &target, Some(type_id));
        }
    }

    /// Both directions: `element_id`'s own outgoing edges, and every other
    /// element's edge that targets it (spec's cascade-delete walk).
    pub fn clear_relationships(&mut self, element_id: &str) {
        if let Some(edges) = self.relationships.remove(element_id) {
            for e in edges {
                if let Some(set) = self.target_index.get_mut(&e.target) {
                    set.remove(element_id);
                    if set.is_empty() {
                        self.target_index.remove(&e.target);
                    }
                }
            }
        }
        if let Some(sources) = self.target_index.remove(element_id) {
            for source in sources {
                if let Some(edges) = self.relationships.get_mut(&source) {
                    edges.retain(|e| e.target != element_id);
                    if edges.is_empty() {
                        self.relationships.remove(&source);
                    }
                }
            }
        }
    }

    /// First `HasParent` edge's target, per the spec's tie-break rule.
    pub fn get_parent_id(&self, element_id: &str) -> Option<ElementId> {
        self.relationships
            .get(element_id)?
            .iter()
            .find(|e| e.type_id == HAS_PARENT)
            .map(|e| e.target.clone())
    }

    /// Derived from the reverse index: true iff some other element has a
    /// `HasParent` edge pointing at `element_id`.
    pub fn has_children(&self, element_id: &str) -> bool {
        let Some(sources) = self.target_index.get(element_id) else {
            return false;
        };
        sources.iter().any(|source| {
            self.relationships
                .get(source)
                .is_some_and(|edges| edges.iter().any(|e| e.target == element_id && e.type_id == HAS_PARENT))
        })
    }

    /// Convenience used by the decomposer's wiring step (spec §4.5's
    /// `HasComponent`/`ComponentOf` pair).
    pub fn add_component(&mut self, parent_id: ElementId, child_id: ElementId) {
        self.add_relationship(parent_id.clone(), child_id.clone(), HAS_COMPONENT.to_string());
        self.add_relationship(child_id, parent_id, COMPONENT_OF.to_string());
    }

    // -- change listeners ---------------------------------------------------

    pub fn add_change_listener(&mut self, listener: ChangeListener) -> ListenerId {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.insert(id, listener);
        id
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Every successful upsert reaches every listener exactly once, in
    /// upsert order; a panicking listener is caught and ignored (spec §9,
    /// §7's "Listener exception" row).
    fn notify_listeners(&self, element_id: &str, value: &ObjectValue) {
        let instance = self.instances.get(element_id);
        for listener in self.listeners.values() {
            let result = catch_unwind(AssertUnwindSafe(|| listener(&element_id.to_string(), value, instance)));
            if result.is_err() {
                tracing::warn!(element_id, "change listener panicked; ignoring");
            }
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            values: self.values.len(),
            instances: self.instances.len(),
            object_types: self.object_types.len(),
            namespaces: self.namespaces.len(),
            relationship_types: self.relationship_types.len(),
            total_edges: self.relationships.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn value(id: &str) -> ObjectValue {
        ObjectValue::new(id, Value::Number(1.0), Utc::now())
    }

    fn instance(id: &str, ns: &str) -> ObjectInstance {
        ObjectInstance {
            element_id: id.to_string(),
            display_name: id.to_string(),
            type_id: "GenericTag".to_string(),
            namespace_uri: ns.to_string(),
            is_composition: false,
        }
    }

    #[test]
    fn upsert_creates_placeholder_ancestor_chain() {
        // P1 / I2 / scenario 5
        let mut store = ObjectStoreState::new();
        store.upsert(value("a.b.c.d"), Some(instance("a.b.c.d", "urn:x")));

        for id in ["a", "a.b", "a.b.c"] {
            let inst = store.get_instance(id).expect("placeholder exists");
            assert_eq!(inst.type_id, "Placeholder");
            let val = store.get_value(id).expect("placeholder value exists");
            assert_eq!(val.value, Value::Null);
            assert_eq!(val.quality.as_deref(), Some("uncertain"));
        }
        assert_eq!(store.get_parent_id("a.b.c.d").as_deref(), Some("a.b.c"));
        assert!(store.has_children("a.b.c"));
        assert!(store.has_children("a"));
    }

    #[test]
    fn bidirectional_parenting_holds_for_every_edge() {
        // P2
        let mut store = ObjectStoreState::new();
        store.upsert(value("x.y"), Some(instance("x.y", "urn:x")));
        let parent = store.get_parent_id("x.y").unwrap();
        assert_eq!(parent, "x");
        assert!(store
            .get_relationships("x", Some(HAS_CHILDREN))
            .iter()
            .any(|e| e.target == "x.y"));
    }

    #[test]
    fn reverse_index_soundness() {
        // P3
        let mut store = ObjectStoreState::new();
        store.add_relationship("s1".into(), "t1".into(), "Likes".into());
        store.add_relationship("s2".into(), "t1".into(), "Likes".into());
        let sources = store.get_sources_for_target("t1");
        assert_eq!(sources.len(), 2);
        for s in &sources {
            assert!(store.get_relationships(s, None).iter().any(|e| e.target == "t1"));
        }
    }

    #[test]
    fn namespace_and_type_indices_match_live_instances() {
        // P4
        let mut store = ObjectStoreState::new();
        store.upsert(value("a"), Some(instance("a", "urn:ns1")));
        store.upsert(value("b"), Some(instance("b", "urn:ns1")));
        let by_ns = store.get_instances_by_namespace("urn:ns1");
        assert_eq!(by_ns.len(), 2);
        let by_type = store.get_instances_by_type("GenericTag");
        assert_eq!(by_type.len(), 2);

        // re-upserting "a" under a new namespace must move it out of ns1
        let mut moved = instance("a", "urn:ns2");
        moved.type_id = "OtherType".to_string();
        store.upsert(value("a"), Some(moved));
        assert_eq!(store.get_instances_by_namespace("urn:ns1").len(), 1);
        assert_eq!(store.get_instances_by_namespace("urn:ns2").len(), 1);
        assert_eq!(store.get_instances_by_type("GenericTag").len(), 1);
    }

    #[test]
    fn adding_identical_edge_twice_is_idempotent() {
        // P7
        let mut store = ObjectStoreState::new();
        assert!(store.add_relationship("a".into(), "b".into(), "Likes".into()));
        assert!(!store.add_relationship("a".into(), "b".into(), "Likes".into()));
        assert_eq!(store.get_relationships("a", None).len(), 1);
    }

    #[test]
    fn cascade_delete_removes_all_edges_both_directions() {
        // scenario 6
        let mut store = ObjectStoreState::new();
        store.add_relationship("a".into(), "mid".into(), "Edge".into());
        store.add_relationship("mid".into(), "b".into(), "Edge".into());
        store.instances.insert("mid".to_string(), instance("mid", "urn:x"));
        store.values.insert("mid".to_string(), value("mid"));

        assert!(store.delete("mid"));

        assert!(store.get_instance("mid").is_none());
        assert!(store.get_relationships("a", None).is_empty());
        assert!(store.get_relationships("mid", None).is_empty());
        assert!(store.get_sources_for_target("mid").is_empty());
        assert!(store.get_sources_for_target("b").is_empty());
    }

    #[test]
    fn delete_root_leaves_grandchildren_in_place() {
        let mut store = ObjectStoreState::new();
        store.upsert(value("root.child.grandchild"), Some(instance("root.child.grandchild", "urn:x")));
        assert!(store.delete("root"));
        assert!(store.get_instance("root").is_none());
        assert!(store.get_instance("root.child").is_some());
        assert!(store.get_instance("root.child.grandchild").is_some());
    }

    #[test]
    fn placeholder_is_replaced_in_place_by_real_instance() {
        let mut store = ObjectStoreState::new();
        store.upsert(value("a.b"), Some(instance("a.b", "urn:x")));
        assert!(store.get_instance("a").unwrap().is_placeholder());

        store.upsert(value("a"), Some(instance("a", "urn:x")));
        let a = store.get_instance("a").unwrap();
        assert!(!a.is_placeholder());
        // relationship to a.b is unaffected by the replacement
        assert!(store
            .get_relationships("a", Some(HAS_CHILDREN))
            .iter()
            .any(|e| e.target == "a.b"));
    }

    #[test]
    fn type_deletion_refused_while_in_use() {
        let mut store = ObjectStoreState::new();
        store.upsert(value("a"), Some(instance("a", "urn:x")));
        assert!(store.delete_object_type("GenericTag").is_err());
        store.delete("a");
        assert!(store.delete_object_type("GenericTag").is_ok());
    }

    #[test]
    fn listener_panic_does_not_break_other_listeners_or_the_store() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let mut store = ObjectStoreState::new();
        store.add_change_listener(Box::new(|_, _, _| panic!("boom")));
        store.add_change_listener(Box::new(move |_, _, _| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));
        store.upsert(value("a"), None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn upsert_drops_stale_has_children_on_superseded_parent() {
        // I1: a stray HasParent edge pointing somewhere other than the
        // elementId's own dot-prefix (e.g. added out-of-band by an admin
        // relationship call) must not leave its HasChildren inverse behind
        // once a later upsert re-derives and resets the canonical parent.
        let mut store = ObjectStoreState::new();
        store.add_relationship("a.b".into(), "stray-parent".into(), HAS_PARENT.to_string());
        store.add_relationship("stray-parent".into(), "a.b".into(), HAS_CHILDREN.to_string());

        store.upsert(value("a.b"), Some(instance("a.b", "urn:x")));

        assert_eq!(store.get_parent_id("a.b").as_deref(), Some("a"));
        assert!(store.get_relationships("stray-parent", Some(HAS_CHILDREN)).is_empty());
        assert!(store
            .get_relationships("a", Some(HAS_CHILDREN))
            .iter()
            .any(|e| e.target == "a.b"));
    }

    #[test]
    fn builtin_relationship_types_seeded_on_construction() {
        let store = ObjectStoreState::new();
        assert_eq!(store.get_all_relationship_types().len(), 4);
        assert!(store.get_relationship_type(HAS_PARENT).is_some());
    }
}
