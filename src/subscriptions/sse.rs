//! Builds the actual `GET /subscriptions/{id}/stream` response (spec §4.7,
//! §6): an initial `: connected` comment, then one `data:` frame per
//! [`super::Command::Notify`] that still has an attached sender.

use crate::model::{ElementId, ObjectValue};

/// Renders the single-element frame body described in spec §4.7: an array
/// containing one `{ [elementId]: { data: [{ value, quality, timestamp }] } }`
/// object. Quality defaults to `"Good"` when absent — the documented
/// SSE/`/objects/value` asymmetry (spec §9).
pub fn render_frame(element_id: &ElementId, value: &ObjectValue) -> String {
    let mut entry = serde_json::Map::new();
    entry.insert(
        "data".to_string(),
        serde_json::json!([{
            "value": serde_json::Value::from(value.value.clone()),
            "quality": value.quality_or_good(),
            "timestamp": value.timestamp.to_rfc3339(),
        }]),
    );
    let mut outer = serde_json::Map::new();
    outer.insert(element_id.clone(), serde_json::Value::Object(entry));
    serde_json::Value::Array(vec![serde_json::Value::Object(outer)]).to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;
    use chrono::Utc;

    #[test]
    fn frame_shape_matches_spec() {
        let value = ObjectValue::new("a.b", Value::Number(1.5), Utc::now());
        let frame = render_frame(&"a.b".to_string(), &value);
        let parsed: serde_json::Value = serde_json::from_str(&frame).expect("valid json");
        let entries = parsed.as_array().expect("top level array");
        assert_eq!(entries.len(), 1);
        let data = &entries[0]["a.b"]["data"];
        assert_eq!(data[0]["value"], serde_json::json!(1.5));
        assert_eq!(data[0]["quality"], serde_json::json!("Good"));
    }
}
