use super::ElementId;
use serde::{Deserialize, Serialize};

/// Registration-only: `uri -> displayName`. Never deleted by runtime events,
/// only by an explicit admin call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub uri: String,
    pub display_name: String,
}

/// Admin-managed catalogue entry for a class of instance. Deletion is
/// refused while any instance still references it (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub element_id: ElementId,
    pub display_name: String,
    pub namespace_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// A single live object in the graph. The store owns every instance
/// exclusively; callers only ever see cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInstance {
    pub element_id: ElementId,
    pub display_name: String,
    pub type_id: String,
    pub namespace_uri: String,
    pub is_composition: bool,
}

impl ObjectInstance {
    /// Builds the auto-created ancestor instance described in spec §4.6:
    /// `typeId = "Placeholder"`, not a composition.
    pub fn placeholder(element_id: impl Into<String>, namespace_uri: impl Into<String>) -> Self {
        let element_id = element_id.into();
        let display_name = element_id
            .rsplit('.')
            .next()
            .unwrap_or(&element_id)
            .to_string();
        Self {
            element_id,
            display_name,
            type_id: super::PLACEHOLDER_TYPE_ID.to_string(),
            namespace_uri: namespace_uri.into(),
            is_composition: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.type_id == super::PLACEHOLDER_TYPE_ID
    }
}
