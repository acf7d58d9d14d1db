//! Small regex helpers shared between the topic-pattern compiler and the
//! element-id/template machinery. Kept outside the main crate so they can be
//! unit tested in isolation from the rest of the pipeline.

use regex::Regex;
use std::sync::LazyLock;

/// Matches a single `{name}` placeholder inside a topic pattern or a
/// template string (`elementIdTemplate`, `displayNameTemplate`, ...).
pub static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("static regex is valid"));

/// A dot-segment of an `ElementId`: at least one character, no dots, no
/// slashes. Used to validate segments produced by sanitizing arbitrary keys.
pub static ELEMENT_ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^./]+$").expect("static regex is valid"));

/// Returns every placeholder name found in `template`, in order of
/// appearance, duplicates included.
pub fn placeholder_names(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// `true` if every dot-segment of `id` is non-empty and contains no `/`.
pub fn is_valid_element_id(id: &str) -> bool {
    !id.is_empty() && id.split('.').all(|seg| ELEMENT_ID_SEGMENT.is_match(seg))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn finds_placeholders_in_order() {
        assert_eq!(
            placeholder_names("{site}/sensors/temp/{id}"),
            vec!["site".to_string(), "id".to_string()]
        );
    }

    #[test]
    fn no_placeholders_is_empty() {
        assert!(placeholder_names("a.b.c").is_empty());
    }

    #[test]
    fn element_id_validation() {
        assert!(is_valid_element_id("a.b.c"));
        assert!(is_valid_element_id("temp"));
        assert!(!is_valid_element_id(""));
        assert!(!is_valid_element_id("a..b"));
        assert!(!is_valid_element_id("a/b.c"));
    }
}
