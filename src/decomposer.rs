//! Expands a structured payload into a tree of child instances (spec §4.5).

use crate::model::{ObjectInstance, ObjectValue};
use crate::schema_mapper::extract_path;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecomposeStrategy {
    Abelara,
    Flat,
    Auto,
}

/// A rule's `decompose` block, verbatim from the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecomposeConfig {
    pub enabled: bool,
    #[serde(default = "default_strategy")]
    pub strategy: DecomposeStrategy,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub child_id_strategy: Option<ChildIdStrategy>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub exclude_fields: Vec<String>,
}

fn default_strategy() -> DecomposeStrategy {
    DecomposeStrategy::Auto
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChildIdStrategy {
    Path,
    Append,
}

const MARKER_FIELDS: [&str; 3] = ["_model", "_name", "_path"];
const DEFAULT_MAX_DEPTH: u32 = 10;

/// One decomposed child: its instance, its value, and the parent it was
/// discovered under (for `HasComponent`/`ComponentOf` wiring by the caller).
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedChild {
    pub instance: ObjectInstance,
    pub value: ObjectValue,
    pub parent_component_id: String,
}

/// Runs decomposition for a primary instance that already landed in the
/// store. `primary` is the already-mapped top-level instance/value pair
/// (its namespace, timestamp and quality are inherited by every child).
pub fn decompose(
    config: &DecomposeConfig,
    decoded: &Value,
    primary_element_id: &str,
    namespace_uri: &str,
    timestamp: DateTime<Utc>,
    quality: Option<&str>,
) -> Vec<DecomposedChild> {
    if !config.enabled {
        return Vec::new();
    }

    let root = match &config.root {
        Some(expr) => match extract_path(decoded, expr) {
            Some(v) => v,
            None => return Vec::new(),
        },
        None => decoded.clone(),
    };

    let Value::Map(map) = root else {
        return Vec::new();
    };

    let max_depth = config.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
    let mut out = Vec::new();
    walk(
        config,
        &map,
        primary_element_id,
        namespace_uri,
        timestamp,
        quality,
        max_depth,
        1,
        &mut out,
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn walk(
    config: &DecomposeConfig,
    map: &BTreeMap<String, Value>,
    parent_id: &str,
    namespace_uri: &str,
    timestamp: DateTime<Utc>,
    quality: Option<&str>,
    max_depth: u32,
    depth: u32,
    out: &mut Vec<DecomposedChild>,
) {
    if max_depth != 0 && depth > max_depth {
        return;
    }

    for (key, value) in map {
        if is_excluded(config, key) {
            continue;
        }

        match value {
            Value::Map(nested) => {
                let Some(candidate) = as_child_candidate(config.strategy, key, nested) else {
                    continue;
                };
                let child_id = child_element_id(config, parent_id, nested, key);
                let scalar_value = shallow_scalars(config, nested);

                let instance = ObjectInstance {
                    element_id: child_id.clone(),
                    display_name: candidate.display_name,
                    type_id: candidate.type_id,
                    namespace_uri: namespace_uri.to_string(),
                    is_composition: false,
                };
                let mut object_value = ObjectValue::new(child_id.clone(), scalar_value, timestamp);
                object_value.quality = quality.map(str::to_string);

                out.push(DecomposedChild {
                    instance,
                    value: object_value,
                    parent_component_id: parent_id.to_string(),
                });

                walk(
                    config,
                    nested,
                    &child_id,
                    namespace_uri,
                    timestamp,
                    quality,
                    max_depth,
                    depth + 1,
                    out,
                );
            }
            // Scalars/arrays nested inside an already-recognized child are
            // carried in that child's own shallow scalar subset instead of
            // being re-emitted as a sibling leaf; only the top decomposition
            // scope turns loose non-mapping fields into ScalarProperty leaves.
            _ if depth > 1 => {}
            scalar => {
                let child_id = format!("{parent_id}.{}", sanitize(key));
                let instance = ObjectInstance {
                    element_id: child_id.clone(),
                    display_name: key.clone(),
                    type_id: "ScalarProperty".to_string(),
                    namespace_uri: namespace_uri.to_string(),
                    is_composition: false,
                };
                let mut object_value = ObjectValue::new(child_id, scalar.clone(), timestamp);
                object_value.quality = quality.map(str::to_string);
                out.push(DecomposedChild {
                    instance,
                    value: object_value,
                    parent_component_id: parent_id.to_string(),
                });
            }
        }
    }
}

struct ChildCandidate {
    display_name: String,
    type_id: String,
}

fn as_child_candidate(
    strategy: DecomposeStrategy,
    key: &str,
    nested: &BTreeMap<String, Value>,
) -> Option<ChildCandidate> {
    let has_marker = nested.contains_key("_name") || nested.contains_key("_model");
    match strategy {
        DecomposeStrategy::Flat => {
            if nested.is_empty() {
                return None;
            }
            Some(ChildCandidate {
                display_name: key.to_string(),
                type_id: "DecomposedComponent".to_string(),
            })
        }
        DecomposeStrategy::Abelara if has_marker => Some(abelara_candidate(key, nested)),
        DecomposeStrategy::Abelara => None,
        DecomposeStrategy::Auto if has_marker => Some(abelara_candidate(key, nested)),
        DecomposeStrategy::Auto => {
            if nested.is_empty() {
                return None;
            }
            Some(ChildCandidate {
                display_name: key.to_string(),
                type_id: "DecomposedComponent".to_string(),
            })
        }
    }
}

fn abelara_candidate(key: &str, nested: &BTreeMap<String, Value>) -> ChildCandidate {
    let display_name = nested
        .get("_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string());
    let type_id = nested
        .get("_model")
        .and_then(Value::as_str)
        .and_then(|m| m.rsplit('/').next())
        .map(str::to_string)
        .unwrap_or_else(|| "DecomposedComponent".to_string());
    ChildCandidate { display_name, type_id }
}

fn child_element_id(
    config: &DecomposeConfig,
    parent_id: &str,
    nested: &BTreeMap<String, Value>,
    key: &str,
) -> String {
    if config.child_id_strategy == Some(ChildIdStrategy::Path) {
        if let Some(path) = nested.get("_path").and_then(Value::as_str) {
            return path.replace('/', ".");
        }
    }
    format!("{parent_id}.{}", sanitize(key))
}

fn sanitize(key: &str) -> String {
    key.replace(['.', '/'], "_")
}

fn is_excluded(config: &DecomposeConfig, key: &str) -> bool {
    MARKER_FIELDS.contains(&key) || config.exclude_fields.iter().any(|f| f == key)
}

/// The shallow scalar subset of `nested`: non-object, non-array fields minus
/// excluded/marker fields. Empty ⇒ `Value::Null`.
fn shallow_scalars(config: &DecomposeConfig, nested: &BTreeMap<String, Value>) -> Value {
    let scalars: BTreeMap<String, Value> = nested
        .iter()
        .filter(|(k, v)| !is_excluded(config, k) && v.is_scalar())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if scalars.is_empty() {
        Value::Null
    } else {
        Value::Map(scalars)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cfg(strategy: DecomposeStrategy) -> DecomposeConfig {
        DecomposeConfig {
            enabled: true,
            strategy,
            root: None,
            child_id_strategy: None,
            max_depth: None,
            exclude_fields: Vec::new(),
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn abelara_strategy_recognizes_name_and_model_markers() {
        let decoded = Value::Map(BTreeMap::from([(
            "motor1".to_string(),
            Value::Map(BTreeMap::from([
                ("_name".to_string(), Value::String("Main Motor".to_string())),
                ("_model".to_string(), Value::String("acme/v2/motor".to_string())),
                ("rpm".to_string(), Value::Number(1200.0)),
            ])),
        )]));
        let children = decompose(&cfg(DecomposeStrategy::Abelara), &decoded, "line1", "urn:x", ts(), None);
        assert_eq!(children.len(), 1);
        let child = &children[0];
        assert_eq!(child.instance.display_name, "Main Motor");
        assert_eq!(child.instance.type_id, "motor");
        assert_eq!(child.instance.element_id, "line1.motor1");
        assert_eq!(child.parent_component_id, "line1");
    }

    #[test]
    fn flat_strategy_treats_every_nonempty_mapping_as_a_child() {
        let decoded = Value::Map(BTreeMap::from([(
            "sub".to_string(),
            Value::Map(BTreeMap::from([("x".to_string(), Value::Number(1.0))])),
        )]));
        let children = decompose(&cfg(DecomposeStrategy::Flat), &decoded, "root", "urn:x", ts(), None);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].instance.type_id, "DecomposedComponent");
        assert_eq!(children[0].instance.display_name, "sub");
    }

    #[test]
    fn scalar_leaves_become_scalar_property_children() {
        let decoded = Value::Map(BTreeMap::from([("temp".to_string(), Value::Number(99.0))]));
        let children = decompose(&cfg(DecomposeStrategy::Flat), &decoded, "root", "urn:x", ts(), None);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].instance.type_id, "ScalarProperty");
        assert_eq!(children[0].value.value, Value::Number(99.0));
    }

    #[test]
    fn marker_and_excluded_fields_never_become_children_or_leaves() {
        let mut c = cfg(DecomposeStrategy::Abelara);
        c.exclude_fields.push("secret".to_string());
        let decoded = Value::Map(BTreeMap::from([
            ("_name".to_string(), Value::String("ignored-at-top".to_string())),
            ("secret".to_string(), Value::Number(1.0)),
            (
                "child".to_string(),
                Value::Map(BTreeMap::from([
                    ("_name".to_string(), Value::String("Child".to_string())),
                ])),
            ),
        ]));
        let children = decompose(&c, &decoded, "root", "urn:x", ts(), None);
        // only "child" qualifies (has a marker); "_name"/"secret" at top never leaf/child
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].instance.display_name, "Child");
    }

    #[test]
    fn non_mapping_root_yields_no_children() {
        let mut c = cfg(DecomposeStrategy::Auto);
        c.root = Some("$.scalarField".to_string());
        let decoded = Value::Map(BTreeMap::from([("scalarField".to_string(), Value::Number(1.0))]));
        let children = decompose(&c, &decoded, "root", "urn:x", ts(), None);
        assert!(children.is_empty());
    }

    #[test]
    fn path_child_id_strategy_uses_underscore_path_when_present() {
        let mut c = cfg(DecomposeStrategy::Abelara);
        c.child_id_strategy = Some(ChildIdStrategy::Path);
        let decoded = Value::Map(BTreeMap::from([(
            "motor1".to_string(),
            Value::Map(BTreeMap::from([
                ("_name".to_string(), Value::String("Motor".to_string())),
                ("_path".to_string(), Value::String("line1/motor1".to_string())),
            ])),
        )]));
        let children = decompose(&c, &decoded, "root", "urn:x", ts(), None);
        assert_eq!(children[0].instance.element_id, "line1.motor1");
    }

    #[test]
    fn max_depth_zero_means_unlimited_recursion() {
        let mut c = cfg(DecomposeStrategy::Flat);
        c.max_depth = Some(0);
        let decoded = Value::Map(BTreeMap::from([(
            "a".to_string(),
            Value::Map(BTreeMap::from([(
                "b".to_string(),
                Value::Map(BTreeMap::from([(
                    "c".to_string(),
                    Value::Map(BTreeMap::from([("d".to_string(), Value::Number(1.0))])),
                )])),
            )])),
        )]));
        let children = decompose(&c, &decoded, "root", "urn:x", ts(), None);
        // a, a.b, a.b.c recognized as nested mapping children; d is already
        // carried inside c's own shallow scalar subset, not a sibling leaf
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn max_depth_bounds_recursion() {
        let mut c = cfg(DecomposeStrategy::Flat);
        c.max_depth = Some(1);
        let decoded = Value::Map(BTreeMap::from([(
            "a".to_string(),
            Value::Map(BTreeMap::from([(
                "b".to_string(),
                Value::Map(BTreeMap::from([("c".to_string(), Value::Number(1.0))])),
            )])),
        )]));
        let children = decompose(&c, &decoded, "root", "urn:x", ts(), None);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].instance.element_id, "root.a");
    }
}
