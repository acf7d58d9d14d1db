//! Topic pattern compilation and the first-match mapping engine (spec §4.1).

use bridge_lib::validators::placeholder_names;
use regex::Regex;
use std::collections::HashMap;

/// A compiled `{name}` pattern. `paramNames` preserves placeholder order so
/// captures can be reported in the order they appeared in the source text.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    pub source: String,
    pub param_names: Vec<String>,
    regex: Regex,
}

/// `paramName -> segment value` for a successful match.
pub type Captures = HashMap<String, String>;

impl TopicPattern {
    /// Compiles `pattern`, escaping every literal metacharacter and turning
    /// each `{name}` into a capturing group matching one non-slash segment,
    /// anchored start-to-end. No MQTT wildcards or regex classes beyond
    /// that are ever produced — this is a deliberate simplification.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let param_names = placeholder_names(pattern);

        let mut regex_src = String::from("^");
        let mut rest = pattern;
        while let Some(start) = rest.find('{') {
            let Some(end) = rest[start..].find('}') else {
                regex_src.push_str(&regex::escape(rest));
                rest = "";
                break;
            };
            let end = start + end;
            regex_src.push_str(&regex::escape(&rest[..start]));
            let name = &rest[start + 1..end];
            regex_src.push_str(&format!("(?P<{}>[^/]+)", sanitize_group_name(name)));
            rest = &rest[end + 1..];
        }
        regex_src.push_str(&regex::escape(rest));
        regex_src.push('$');

        let regex = Regex::new(&regex_src)?;
        Ok(TopicPattern {
            source: pattern.to_string(),
            param_names,
            regex,
        })
    }

    /// Matches `topic`, returning the capture map on success.
    pub fn matches(&self, topic: &str) -> Option<Captures> {
        let caps = self.regex.captures(topic)?;
        Some(
            self.param_names
                .iter()
                .filter_map(|name| {
                    caps.name(&sanitize_group_name(name))
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// The broker-side MQTT subscription filter: every `{x}` replaced with
    /// a single-level `+` wildcard.
    pub fn mqtt_filter(&self) -> String {
        bridge_lib::validators::PLACEHOLDER
            .replace_all(&self.source, "+")
            .to_string()
    }
}

/// Regex named groups must be valid identifiers; placeholder names coming
/// from user config might not be, so map them through an index-qualified
/// synthetic name and look them up by position instead of trusting the raw
/// text to be regex-identifier-safe.
fn sanitize_group_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    out.push('g');
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// A single configured mapping rule: the compiled pattern plus an opaque
/// payload (`R`) carrying whatever the caller needs — in this crate, a
/// [`crate::config::MappingRule`].
#[derive(Debug, Clone)]
pub struct Rule<R> {
    pub id: String,
    pub pattern: TopicPattern,
    pub payload: R,
}

/// Compiles rules in insertion order and returns the first match (or all
/// matches via [`MappingEngine::match_all`]). Mirrors spec §4.1's tie-break:
/// first-inserted wins.
#[derive(Debug, Default)]
pub struct MappingEngine<R> {
    rules: Vec<Rule<R>>,
}

impl<R> MappingEngine<R> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, id: impl Into<String>, pattern: TopicPattern, payload: R) {
        self.rules.push(Rule {
            id: id.into(),
            pattern,
            payload,
        });
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[Rule<R>] {
        &self.rules
    }

    /// First matching rule, in insertion order.
    pub fn match_topic(&self, topic: &str) -> Option<(&Rule<R>, Captures)> {
        self.rules
            .iter()
            .find_map(|r| r.pattern.matches(topic).map(|c| (r, c)))
    }

    /// Every matching rule, in insertion order.
    pub fn match_all(&self, topic: &str) -> Vec<(&Rule<R>, Captures)> {
        self.rules
            .iter()
            .filter_map(|r| r.pattern.matches(topic).map(|c| (r, c)))
            .collect()
    }
}

/// Literal substitution of `{key}` with `captures[key]`; missing keys render
/// as empty strings. No escaping, no nested templates (spec §4.4).
pub fn render_template(template: &str, captures: &Captures) -> String {
    bridge_lib::validators::PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            captures.get(&caps[1]).cloned().unwrap_or_default()
        })
        .to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compiles_and_matches_simple_pattern() {
        let p = TopicPattern::compile("{site}/sensors/temp/{id}").expect("compiles");
        let caps = p.matches("f1/sensors/temp/s01").expect("matches");
        assert_eq!(caps.get("site").map(String::as_str), Some("f1"));
        assert_eq!(caps.get("id").map(String::as_str), Some("s01"));
    }

    #[test]
    fn placeholder_never_crosses_a_slash() {
        let p = TopicPattern::compile("{site}/temp").expect("compiles");
        assert!(p.matches("a/b/temp").is_none());
    }

    #[test]
    fn literal_pattern_matches_with_empty_captures() {
        // R1: literal pattern with no placeholders matches with empty captures.
        let p = TopicPattern::compile("a/b/c").expect("compiles");
        let caps = p.matches("a/b/c").expect("matches");
        assert!(caps.is_empty());
    }

    #[test]
    fn render_round_trips_substituted_topic() {
        // R2
        let p = TopicPattern::compile("{site}/sensors/{id}").expect("compiles");
        let topic = "plantA/sensors/unit9";
        let caps = p.matches(topic).expect("matches");
        let rendered = render_template("{site}/sensors/{id}", &caps);
        assert_eq!(rendered, topic);
    }

    #[test]
    fn mqtt_filter_replaces_placeholders_with_plus() {
        let p = TopicPattern::compile("{site}/sensors/temp/{id}").expect("compiles");
        assert_eq!(p.mqtt_filter(), "+/sensors/temp/+");
    }

    #[test]
    fn first_match_wins_on_overlapping_rules() {
        let mut engine: MappingEngine<u32> = MappingEngine::new();
        engine.add_rule(
            "general",
            TopicPattern::compile("{a}/{b}").expect("compiles"),
            1,
        );
        engine.add_rule(
            "specific",
            TopicPattern::compile("x/{b}").expect("compiles"),
            2,
        );
        let (rule, _) = engine.match_topic("x/y").expect("matches");
        assert_eq!(rule.payload, 1, "first-inserted rule wins");
        assert_eq!(engine.match_all("x/y").len(), 2);
    }

    #[test]
    fn missing_template_key_renders_empty() {
        let caps = Captures::new();
        assert_eq!(render_template("prefix.{missing}.suffix", &caps), "prefix..suffix");
    }
}
