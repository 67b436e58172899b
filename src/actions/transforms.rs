//! Reusable payload transforms
//!
//! Every transform is pure: it reads the previous payload and the request
//! arguments and returns a new payload. Neither input is modified.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::machine::TransformFn;

/// Leaves the payload unchanged.
pub fn identity() -> TransformFn {
    Arc::new(|payload, _args| payload.clone())
}

/// Shallow-merges an object of arguments over an object payload.
///
/// Non-object arguments leave the payload unchanged. A non-object payload
/// is replaced by the arguments.
pub fn merge_arguments() -> TransformFn {
    Arc::new(|payload, args| match (payload, args) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (k, v) in patch {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (_, Value::Object(_)) => args.clone(),
        _ => payload.clone(),
    })
}

/// Stores the arguments under `key`, replacing any previous value.
pub fn record_under(key: &'static str) -> TransformFn {
    Arc::new(move |payload, args| {
        let mut object = as_object(payload);
        object.insert(key.to_string(), args.clone());
        Value::Object(object)
    })
}

/// Appends the arguments to the array under `key`, creating it if absent.
pub fn append_to(key: &'static str) -> TransformFn {
    Arc::new(move |payload, args| {
        let mut object = as_object(payload);
        let mut items = match object.remove(key) {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        items.push(args.clone());
        object.insert(key.to_string(), Value::Array(items));
        Value::Object(object)
    })
}

fn as_object(payload: &Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity() {
        let payload = json!({"a": 1});
        assert_eq!(identity()(&payload, &json!({"b": 2})), payload);
    }

    #[test]
    fn test_merge_arguments() {
        let out = merge_arguments()(&json!({"a": 1, "b": 1}), &json!({"b": 2, "c": 3}));
        assert_eq!(out, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_record_under_does_not_mutate_input() {
        let payload = json!({"items": [1]});
        let out = record_under("cancellation")(&payload, &json!({"reason": "late"}));

        assert_eq!(payload, json!({"items": [1]}));
        assert_eq!(out, json!({"items": [1], "cancellation": {"reason": "late"}}));
    }

    #[test]
    fn test_append_to() {
        let t = append_to("ratings");
        let once = t(&json!({}), &json!({"stars": 4}));
        let twice = t(&once, &json!({"stars": 5}));
        assert_eq!(twice, json!({"ratings": [{"stars": 4}, {"stars": 5}]}));
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let out = record_under("note")(&json!(7), &json!("x"));
        assert_eq!(out, json!({"value": 7, "note": "x"}));
    }
}
