use super::ElementId;
use serde::{Deserialize, Serialize};

pub const RELATIONSHIP_NAMESPACE: &str = "urn:i3x:relationships";

/// Catalogue entry for a directed edge type, e.g. `HasParent`. `reverse_of`
/// names the paired inverse type (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipType {
    pub element_id: ElementId,
    pub display_name: String,
    pub namespace_uri: String,
    pub reverse_of: String,
}

/// The four built-in relationship types seeded at store construction (spec
/// §3). Every `HasParent`/`HasChildren` and `HasComponent`/`ComponentOf`
/// pair is maintained as a true inverse, never just assumed.
pub const BUILTIN_RELATIONSHIP_TYPES: [(&str, &str, &str); 4] = [
    ("HasParent", "Has Parent", "HasChildren"),
    ("HasChildren", "Has Children", "HasParent"),
    ("HasComponent", "Has Component", "ComponentOf"),
    ("ComponentOf", "Component Of", "HasComponent"),
];

impl RelationshipType {
    pub fn builtins() -> Vec<RelationshipType> {
        BUILTIN_RELATIONSHIP_TYPES
            .iter()
            .map(|(id, name, reverse)| RelationshipType {
                element_id: id.to_string(),
                display_name: name.to_string(),
                namespace_uri: RELATIONSHIP_NAMESPACE.to_string(),
                reverse_of: reverse.to_string(),
            })
            .collect()
    }
}

/// A directed `(source -> target, typeId)` edge. Duplicates are forbidden —
/// adding the same triple twice is a no-op (spec P7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub source: ElementId,
    pub target: ElementId,
    pub type_id: String,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        type_id: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            type_id: type_id.into(),
        }
    }
}

pub const HAS_PARENT: &str = "HasParent";
pub const HAS_CHILDREN: &str = "HasChildren";
pub const HAS_COMPONENT: &str = "HasComponent";
pub const COMPONENT_OF: &str = "ComponentOf";
