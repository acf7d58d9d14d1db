//! The canonical data model: [`ElementId`], [`ObjectValue`], [`ObjectInstance`]
//! and friends. Types here are plain data — the algorithms that maintain
//! invariants over them live in [`crate::store`].

mod instance;
mod relationship;
mod subscription;

pub use instance::{Namespace, ObjectInstance, ObjectType};
pub use relationship::{
    Relationship, RelationshipType, BUILTIN_RELATIONSHIP_TYPES, COMPONENT_OF, HAS_CHILDREN,
    HAS_COMPONENT, HAS_PARENT, RELATIONSHIP_NAMESPACE,
};
pub use subscription::{
    CreateSubscriptionRequest, Subscription, SubscriptionId, SubscriptionInfo,
    DEFAULT_MAX_DEPTH, DEFAULT_QUEUE_HIGH_WATER_MARK,
};

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, dot-segmented identifier. The store never parses it into a
/// structured type — it only ever splits on `.` to find the parent prefix —
/// so this is a thin alias rather than a newtype wrapper.
pub type ElementId = String;

/// Returns the parent element id (everything but the last dot-segment), or
/// `None` if `id` has no dot (a top-level element) or the prefix would equal
/// `id` itself (guards against the cycle spec §5 calls out).
pub fn parent_of(id: &str) -> Option<String> {
    let (prefix, _last) = id.rsplit_once('.')?;
    if prefix.is_empty() || prefix == id {
        None
    } else {
        Some(prefix.to_string())
    }
}

/// The current last-known-value triple for an [`ElementId`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectValue {
    pub element_id: ElementId,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl ObjectValue {
    pub fn new(element_id: impl Into<String>, value: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            element_id: element_id.into(),
            value,
            timestamp,
            quality: None,
        }
    }

    /// `quality` defaulted to the `"Good"` sentinel, used only when building
    /// SSE frames — `/objects/value` leaves a missing quality untouched.
    pub fn quality_or_good(&self) -> &str {
        self.quality.as_deref().unwrap_or("Good")
    }
}

pub const PLACEHOLDER_TYPE_ID: &str = "Placeholder";
pub const PLACEHOLDER_QUALITY: &str = "uncertain";
