//! Layered merge of JSON spec documents.
//!
//! `overlay` wins for every key it sets. Nested objects merge recursively,
//! anything else (scalars, arrays) is replaced outright. A `null` in the
//! overlay counts as unset.

use serde_json::{Map, Value as Json};

fn empty() -> Json {
    Json::Object(Map::new())
}

/// Merge `overlay` on top of `base`. Absent (`null`) inputs are empty documents.
pub fn merge_spec(base: &Json, overlay: &Json) -> Json {
    match (base, overlay) {
        (Json::Null, Json::Null) => empty(),
        (base, Json::Null) => base.clone(),
        (Json::Object(b), Json::Object(o)) => Json::Object(merge_maps(b, o)),
        (_, Json::Object(o)) => Json::Object(merge_maps(&Map::new(), o)),
        (_, overlay) => overlay.clone(),
    }
}

fn merge_maps(base: &Map<String, Json>, overlay: &Map<String, Json>) -> Map<String, Json> {
    let mut out = base.clone();
    for (key, value) in overlay {
        match value {
            Json::Null => {}
            Json::Object(nested) => {
                let merged = match out.get(key) {
                    Some(Json::Object(existing)) => merge_maps(existing, nested),
                    _ => merge_maps(&Map::new(), nested),
                };
                out.insert(key.clone(), Json::Object(merged));
            }
            other => {
                out.insert(key.clone(), other.clone());
            }
        }
    }
    out
}

/// `merge(merge(template, config), request)`.
pub fn merge_layers(template: &Json, config: &Json, request: &Json) -> Json {
    merge_spec(&merge_spec(template, config), request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_wins_and_base_only_keys_survive() {
        let base = json!({"size": 1, "version": "v1"});
        let overlay = json!({"size": 3});
        assert_eq!(merge_spec(&base, &overlay), json!({"size": 3, "version": "v1"}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let base = json!({"pod": {"resources": {"cpu": "100m", "memory": "1Gi"}, "replicas": 1}});
        let overlay = json!({"pod": {"resources": {"cpu": "500m"}}});
        assert_eq!(
            merge_spec(&base, &overlay),
            json!({"pod": {"resources": {"cpu": "500m", "memory": "1Gi"}, "replicas": 1}})
        );
    }

    #[test]
    fn arrays_are_replaced_not_concatenated() {
        let base = json!({"args": ["a", "b"]});
        let overlay = json!({"args": ["c"]});
        assert_eq!(merge_spec(&base, &overlay), json!({"args": ["c"]}));
    }

    #[test]
    fn type_change_takes_overlay_value() {
        let base = json!({"storage": {"size": "1Gi"}});
        let overlay = json!({"storage": "ephemeral"});
        assert_eq!(merge_spec(&base, &overlay), json!({"storage": "ephemeral"}));
    }

    #[test]
    fn null_overlay_values_keep_base() {
        let base = json!({"size": 1, "tls": {"enabled": true}});
        let overlay = json!({"size": null, "tls": null, "extra": 2});
        assert_eq!(merge_spec(&base, &overlay), json!({"size": 1, "tls": {"enabled": true}, "extra": 2}));
    }

    #[test]
    fn absent_inputs_are_empty_documents() {
        assert_eq!(merge_spec(&Json::Null, &Json::Null), json!({}));
        assert_eq!(merge_spec(&Json::Null, &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge_spec(&json!({"a": 1}), &Json::Null), json!({"a": 1}));
    }

    #[test]
    fn three_layers_respect_precedence() {
        let template = json!({"size": 1, "version": "v1", "backup": {"enabled": false, "schedule": "daily"}});
        let config = json!({"size": 3, "backup": {"enabled": true}});
        let request = json!({"version": "v2", "backup": {"schedule": "hourly"}});
        let merged = merge_layers(&template, &config, &request);
        assert_eq!(
            merged,
            json!({"size": 3, "version": "v2", "backup": {"enabled": true, "schedule": "hourly"}})
        );
    }
}
