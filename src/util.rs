//! Small shared helpers: template-bounded JSON merge

use serde_json::{Map, Value};

/// Merge `input` over `template`, keeping only keys the template declares.
///
/// The template defines the shape: keys absent from it are dropped from the
/// input, keys absent from the input keep the template value, and nested
/// objects merge recursively. A `null` input value is kept as-is (it counts
/// as "present"), so `{a: null}` over `{a: false}` yields `{a: null}`.
///
/// Used when loading settings sidecars and applying project updates, so
/// partial or stale JSON degrades to defaults instead of failing.
pub fn merge_within_template(input: &Value, template: &Value) -> Value {
    match (input, template) {
        (Value::Object(input_map), Value::Object(template_map)) => {
            let mut merged = Map::new();
            for (key, template_value) in template_map {
                match input_map.get(key) {
                    Some(input_value) => {
                        if template_value.is_object() && input_value.is_object() {
                            merged.insert(
                                key.clone(),
                                merge_within_template(input_value, template_value),
                            );
                        } else {
                            merged.insert(key.clone(), input_value.clone());
                        }
                    }
                    None => {
                        merged.insert(key.clone(), template_value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        // Non-object template: the input wins wholesale
        _ => input.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_input_values_for_known_keys() {
        let input = json!({"a": null, "b": {"c": [1, 2, 3], "d": 1000}});
        let template = json!({"a": false, "b": {"c": [], "d": -1}});
        let merged = merge_within_template(&input, &template);
        assert_eq!(merged, json!({"a": null, "b": {"c": [1, 2, 3], "d": 1000}}));
    }

    #[test]
    fn test_merge_drops_keys_not_in_template() {
        let input = json!({"known": 1, "unknown": "junk"});
        let template = json!({"known": 0});
        assert_eq!(
            merge_within_template(&input, &template),
            json!({"known": 1})
        );
    }

    #[test]
    fn test_merge_fills_missing_keys_from_template() {
        let input = json!({});
        let template = json!({"sorting": {"key": "name"}, "icon": null});
        assert_eq!(merge_within_template(&input, &template), template);
    }

    #[test]
    fn test_merge_recurses_into_nested_objects() {
        let input = json!({"outer": {"keep": true}});
        let template = json!({"outer": {"keep": false, "default": 7}});
        assert_eq!(
            merge_within_template(&input, &template),
            json!({"outer": {"keep": true, "default": 7}})
        );
    }
}
