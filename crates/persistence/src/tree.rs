//! Tree semantics shared by the store implementations.
//!
//! Values are kept normalized: arrays become objects keyed by index, nulls
//! and empty containers do not exist. Reads convert objects keyed `0..n`
//! back into arrays.

use serde_json::{Map, Value};

/// Normalizes a value for storage. `None` means "nothing stored".
pub fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let map: Map<String, Value> = items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| normalize(item).map(|item| (index.to_string(), item)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(key, item)| normalize(item).map(|item| (key, item)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        scalar => Some(scalar),
    }
}

/// Turns objects whose keys are exactly `"0"..n` back into arrays.
pub fn denormalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut map: Map<String, Value> = map
                .into_iter()
                .map(|(key, item)| (key, denormalize(item)))
                .collect();
            let sequential =
                !map.is_empty() && (0..map.len()).all(|index| map.contains_key(&index.to_string()));
            if sequential {
                let items = (0..map.len())
                    .filter_map(|index| map.remove(&index.to_string()))
                    .collect();
                Value::Array(items)
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// Whether a node holds nothing.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Node at `segments`, if any.
pub fn get_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let node = segments
        .iter()
        .try_fold(root, |node, key| node.as_object()?.get(key))?;
    (!is_empty(node)).then_some(node)
}

/// Replaces the node at `segments`. `None` deletes it and prunes parents
/// left empty. Writing below a scalar replaces the scalar.
pub fn set_at(root: &mut Value, segments: &[String], value: Option<Value>) {
    let Some((head, rest)) = segments.split_first() else {
        *root = value.unwrap_or(Value::Null);
        return;
    };
    if !root.is_object() {
        if value.is_none() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    if let Value::Object(map) = root {
        if rest.is_empty() {
            match value {
                Some(value) => {
                    map.insert(head.clone(), value);
                }
                None => {
                    map.remove(head);
                }
            }
            return;
        }
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
        if is_empty(child) {
            map.remove(head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(raw: &str) -> Vec<String> {
        raw.split('/').filter(|s| !s.is_empty()).map(String::from).collect()
    }

    #[test]
    fn test_normalize_drops_nulls_and_empties() {
        let value = json!({"a": null, "b": {}, "c": [], "d": {"e": null}, "f": 0, "g": ""});
        assert_eq!(normalize(value), Some(json!({"f": 0, "g": ""})));
        assert_eq!(normalize(json!({"a": null})), None);
        assert_eq!(normalize(Value::Null), None);
    }

    #[test]
    fn test_normalize_arrays_become_objects() {
        let value = json!([{"id": 1}, null, {"id": 3}]);
        assert_eq!(
            normalize(value),
            Some(json!({"0": {"id": 1}, "2": {"id": 3}}))
        );
    }

    #[test]
    fn test_denormalize_sequential_keys() {
        assert_eq!(
            denormalize(json!({"0": "a", "1": "b"})),
            json!(["a", "b"])
        );
        // Gaps stay an object.
        assert_eq!(
            denormalize(json!({"0": "a", "2": "c"})),
            json!({"0": "a", "2": "c"})
        );
        assert_eq!(
            denormalize(json!({"x": {"0": 1, "1": 2}})),
            json!({"x": [1, 2]})
        );
    }

    #[test]
    fn test_set_and_get() {
        let mut root = Value::Null;
        set_at(&mut root, &segs("a/b"), Some(json!(1)));
        set_at(&mut root, &segs("a/c"), Some(json!(2)));
        assert_eq!(get_at(&root, &segs("a/b")), Some(&json!(1)));
        assert_eq!(get_at(&root, &segs("a")), Some(&json!({"b": 1, "c": 2})));
        assert_eq!(get_at(&root, &segs("a/b/x")), None);
        assert_eq!(get_at(&root, &segs("z")), None);
    }

    #[test]
    fn test_delete_prunes_empty_parents() {
        let mut root = Value::Null;
        set_at(&mut root, &segs("a/b/c"), Some(json!(1)));
        set_at(&mut root, &segs("x"), Some(json!(true)));
        set_at(&mut root, &segs("a/b/c"), None);
        assert_eq!(root, json!({"x": true}));
    }

    #[test]
    fn test_write_below_scalar_replaces_it() {
        let mut root = json!({"a": 5});
        set_at(&mut root, &segs("a/b"), Some(json!(1)));
        assert_eq!(root, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut root = json!({"a": 5});
        set_at(&mut root, &segs("q/r"), None);
        assert_eq!(root, json!({"a": 5}));
    }

    #[test]
    fn test_root_write() {
        let mut root = json!({"a": 5});
        set_at(&mut root, &[], None);
        assert!(is_empty(&root));
    }
}
