//! Derives an [`ObjectValue`]/[`ObjectInstance`] pair from a matched topic,
//! its captures, and a decoded payload (spec §4.4).

use crate::byte_extractor::ExtractSpec;
use crate::model::{ObjectInstance, ObjectType, ObjectValue};
use crate::topic_pattern::{render_template, Captures};
use crate::value::Value;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One configured mapping: everything needed to carry a matched message from
/// raw bytes through to a stored element. Deserialized straight out of the
/// `mappings[]` array in the configuration document (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub id: String,
    pub topic: String,
    pub codec: String,
    #[serde(default)]
    pub extract: Option<ExtractSpec>,
    #[serde(default)]
    pub element_id_template: Option<String>,
    #[serde(default)]
    pub value_extractor: Option<String>,
    #[serde(default)]
    pub timestamp_extractor: Option<String>,
    #[serde(default)]
    pub quality_extractor: Option<String>,
    #[serde(default)]
    pub namespace_uri: Option<String>,
    #[serde(default)]
    pub object_type_id: Option<String>,
    #[serde(default)]
    pub display_name_template: Option<String>,
    #[serde(default)]
    pub decompose: Option<crate::decomposer::DecomposeConfig>,
}

/// The mapper's output: one primary `(instance, value)` pair, ready for
/// `ObjectStore::upsert` and for the decomposer to expand further.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedObject {
    pub instance: ObjectInstance,
    pub value: ObjectValue,
}

/// Runs the spec §4.4 algorithm. `decoded` is whatever the codec produced;
/// `receive_time` is the fallback timestamp when no extractor resolves one.
pub fn map_message(
    rule: &MappingRule,
    captures: &Captures,
    topic: &str,
    decoded: &Value,
    receive_time: DateTime<Utc>,
) -> MappedObject {
    let element_id = match &rule.element_id_template {
        Some(template) => render_template(template, captures),
        None => topic.replace('/', "."),
    };

    let value = rule
        .value_extractor
        .as_deref()
        .and_then(|expr| extract_path(decoded, expr))
        .filter(|v| !matches!(v, Value::Null))
        .unwrap_or_else(|| decoded.clone());

    let timestamp = rule
        .timestamp_extractor
        .as_deref()
        .and_then(|expr| extract_path(decoded, expr))
        .and_then(|v| timestamp_from_value(&v))
        .unwrap_or(receive_time);

    let quality = rule
        .quality_extractor
        .as_deref()
        .and_then(|expr| extract_path(decoded, expr))
        .and_then(|v| v.as_str().map(str::to_string));

    let namespace_uri = rule
        .namespace_uri
        .as_deref()
        .map(|t| render_template(t, captures))
        .or_else(|| captures.get("namespace").cloned())
        .unwrap_or_else(|| "urn:default".to_string());

    let type_id = rule
        .object_type_id
        .as_deref()
        .map(|t| render_template(t, captures))
        .unwrap_or_else(|| "GenericTag".to_string());

    let display_name = rule
        .display_name_template
        .as_deref()
        .map(|t| render_template(t, captures))
        .unwrap_or_else(|| element_id.clone());

    let instance = ObjectInstance {
        element_id: element_id.clone(),
        display_name,
        type_id,
        namespace_uri,
        is_composition: false,
    };

    let mut object_value = ObjectValue::new(element_id, value, timestamp);
    object_value.quality = quality;

    MappedObject {
        instance,
        value: object_value,
    }
}

/// A string resolves as-is; a number is treated as milliseconds since the
/// epoch; anything else fails to resolve.
fn timestamp_from_value(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(*n as i64).single(),
        _ => None,
    }
}

/// Minimal JSONPath subset (spec §4.4): an optional leading `$.`, then
/// dot-separated keys, each optionally suffixed with `[index]`. Any type
/// mismatch along the way yields `None` ("undefined").
pub fn extract_path(root: &Value, expr: &str) -> Option<Value> {
    let expr = expr.strip_prefix("$.").unwrap_or(expr);
    if expr.is_empty() {
        return Some(root.clone());
    }

    let mut current = root.clone();
    for segment in expr.split('.') {
        let (key, index) = split_index(segment);
        if !key.is_empty() {
            current = current.as_map()?.get(key)?.clone();
        }
        if let Some(i) = index {
            current = match &current {
                Value::List(items) => items.get(i)?.clone(),
                _ => return None,
            };
        }
    }
    Some(current)
}

/// Splits `name[index]` into `("name", Some(index))`, or `(segment, None)`
/// when there is no bracket suffix.
fn split_index(segment: &str) -> (&str, Option<usize>) {
    let Some(open) = segment.find('[') else {
        return (segment, None);
    };
    let Some(close) = segment[open..].find(']') else {
        return (segment, None);
    };
    let idx: Option<usize> = segment[open + 1..open + close].parse().ok();
    (&segment[..open], idx)
}

/// An [`ObjectType`] registration matching `GenericTag`, the implicit
/// fallback type for anything the mapper does not otherwise classify.
pub fn generic_tag_type(namespace_uri: &str) -> ObjectType {
    ObjectType {
        element_id: "GenericTag".to_string(),
        display_name: "Generic Tag".to_string(),
        namespace_uri: namespace_uri.to_string(),
        schema: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    fn rule() -> MappingRule {
        MappingRule {
            id: "r1".to_string(),
            topic: "{site}/sensors/{id}".to_string(),
            codec: "json".to_string(),
            extract: None,
            element_id_template: Some("plant.{site}.{id}".to_string()),
            value_extractor: Some("$.reading".to_string()),
            timestamp_extractor: None,
            quality_extractor: Some("$.status".to_string()),
            namespace_uri: None,
            object_type_id: Some("TempSensor".to_string()),
            display_name_template: None,
            decompose: None,
        }
    }

    fn captures() -> Captures {
        Captures::from([
            ("site".to_string(), "f1".to_string()),
            ("id".to_string(), "s01".to_string()),
            ("namespace".to_string(), "urn:plant-f1".to_string()),
        ])
    }

    #[test]
    fn maps_element_id_value_quality_and_namespace_fallback() {
        let decoded = Value::Map(BTreeMap::from([
            ("reading".to_string(), Value::Number(21.5)),
            ("status".to_string(), Value::String("Good".to_string())),
        ]));
        let mapped = map_message(&rule(), &captures(), "f1/sensors/s01", &decoded, Utc::now());
        assert_eq!(mapped.value.element_id, "plant.f1.s01");
        assert_eq!(mapped.value.value.as_f64(), Some(21.5));
        assert_eq!(mapped.value.quality.as_deref(), Some("Good"));
        assert_eq!(mapped.instance.namespace_uri, "urn:plant-f1");
        assert_eq!(mapped.instance.type_id, "TempSensor");
        assert!(!mapped.instance.is_composition);
    }

    #[test]
    fn missing_element_id_template_falls_back_to_topic_with_dots() {
        let mut r = rule();
        r.element_id_template = None;
        let decoded = Value::Null;
        let mapped = map_message(&r, &captures(), "f1/sensors/s01", &decoded, Utc::now());
        assert_eq!(mapped.value.element_id, "f1.sensors.s01");
    }

    #[test]
    fn path_expression_walks_nested_objects_and_arrays() {
        let decoded = Value::Map(BTreeMap::from([(
            "a".to_string(),
            Value::Map(BTreeMap::from([(
                "list".to_string(),
                Value::List(vec![Value::Number(1.0), Value::Number(2.0)]),
            )])),
        )]));
        assert_eq!(extract_path(&decoded, "$.a.list[1]"), Some(Value::Number(2.0)));
    }

    #[test]
    fn path_expression_type_mismatch_is_none() {
        let decoded = Value::Number(1.0);
        assert_eq!(extract_path(&decoded, "$.a.b"), None);
    }

    #[test]
    fn numeric_timestamp_is_interpreted_as_millis_since_epoch() {
        let mut r = rule();
        r.timestamp_extractor = Some("$.ts".to_string());
        let decoded = Value::Map(BTreeMap::from([(
            "ts".to_string(),
            Value::Number(1_700_000_000_000.0),
        )]));
        let mapped = map_message(&r, &captures(), "f1/sensors/s01", &decoded, Utc::now());
        assert_eq!(mapped.value.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn missing_timestamp_extractor_falls_back_to_receive_time() {
        let receive_time = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
        let decoded = Value::Null;
        let mapped = map_message(&rule(), &captures(), "f1/sensors/s01", &decoded, receive_time);
        assert_eq!(mapped.value.timestamp, receive_time);
    }
}
