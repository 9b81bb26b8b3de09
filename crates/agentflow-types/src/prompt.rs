//! Shared key/value formatting used when rendering contexts into prompts.
//!
//! Both `ChainContext` and `AgentContext` render maps the same way:
//! keys are title-cased, booleans become Yes/No, null and empty lists
//! become "Not specified", objects are pretty-printed JSON and plain lists
//! are comma-joined.

use serde_json::{Map, Value};

/// Placeholder rendered for null values and empty lists.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Turn a snake_case / kebab-case key into "Title Case".
pub fn title_case(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a single JSON value for prompt display.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Null => NOT_SPECIFIED.to_string(),
        Value::Array(items) if items.is_empty() => NOT_SPECIFIED.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_default()
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Render every entry of a map as `**Key:** value` lines.
pub fn format_entries(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(key, value)| format!("**{}:** {}", title_case(key), format_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a `## Heading` section, or `None` when the map is empty.
pub fn format_section(heading: &str, map: &Map<String, Value>) -> Option<String> {
    if map.is_empty() {
        return None;
    }
    Some(format!("## {heading}\n\n{}", format_entries(map)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_title_case_handles_separators() {
        assert_eq!(title_case("deliverable_alternatives"), "Deliverable Alternatives");
        assert_eq!(title_case("client-name"), "Client Name");
        assert_eq!(title_case("score"), "Score");
        assert_eq!(title_case("step_0"), "Step 0");
    }

    #[test]
    fn test_format_value_rules() {
        assert_eq!(format_value(&json!(true)), "Yes");
        assert_eq!(format_value(&json!(false)), "No");
        assert_eq!(format_value(&Value::Null), "Not specified");
        assert_eq!(format_value(&json!(["a", "b", 3])), "a, b, 3");
        assert_eq!(format_value(&json!(42)), "42");

        let nested = format_value(&json!({"name": "Acme"}));
        assert!(nested.contains("\"name\": \"Acme\""));
        assert!(nested.contains('\n'));
    }

    #[test]
    fn test_empty_list_is_not_specified() {
        assert_eq!(format_value(&json!([])), NOT_SPECIFIED);

        let mut map = Map::new();
        map.insert("competitors".to_string(), json!([]));
        assert_eq!(format_entries(&map), "**Competitors:** Not specified");
    }

    #[test]
    fn test_list_of_objects_is_pretty_json() {
        let rendered = format_value(&json!([{"title": "Logo"}]));
        assert!(rendered.starts_with('['));
        assert!(rendered.contains("\"title\": \"Logo\""));
    }

    #[test]
    fn test_empty_section_is_omitted() {
        assert!(format_section("Client", &Map::new()).is_none());

        let mut map = Map::new();
        map.insert("industry".to_string(), json!("Retail"));
        let section = format_section("Client", &map).unwrap();
        assert_eq!(section, "## Client\n\n**Industry:** Retail");
    }
}
