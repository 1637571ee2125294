//! JSON merge-patch over untyped document trees.
//!
//! A patch document describes only the fields that change:
//!
//! - a key whose patch value is `null` is removed from the target,
//! - a key absent from the patch leaves the target untouched,
//! - two objects at the same position are merged field by field,
//! - anything else (scalars, arrays, an object over a non-object) replaces
//!   the target value wholesale. Arrays are never merged element-wise.
//!
//! Every partial update issued by the controllers goes through this module,
//! either client-side in [`crate::backend::MemoryBackend`] or server-side
//! behind the HTTP API, so that independent writers only touch the fields
//! they own.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergePatchError {
    #[error("invalid existing document: {0}")]
    InvalidExisting(#[source] serde_json::Error),

    #[error("invalid patch document: {0}")]
    InvalidPatch(#[source] serde_json::Error),

    #[error("failed to encode merged document: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Merges raw JSON `patch` bytes into raw JSON `existing` bytes.
pub fn merge(existing: &[u8], patch: &[u8]) -> Result<Vec<u8>, MergePatchError> {
    let mut target: Value =
        serde_json::from_slice(existing).map_err(MergePatchError::InvalidExisting)?;
    let patch: Value = serde_json::from_slice(patch).map_err(MergePatchError::InvalidPatch)?;
    apply(&mut target, &patch);
    serde_json::to_vec(&target).map_err(MergePatchError::Encode)
}

/// Applies a typed partial object onto raw JSON bytes.
///
/// Fields the patch type skips during serialization (typically `None` with
/// `skip_serializing_if`) are absent from the patch and therefore preserved.
pub fn patch_object<T: Serialize + ?Sized>(
    existing: &[u8],
    patch: &T,
) -> Result<Vec<u8>, MergePatchError> {
    let patch = serde_json::to_vec(patch).map_err(MergePatchError::InvalidPatch)?;
    merge(existing, &patch)
}

/// Converts a typed partial object into a patch document.
pub fn to_patch<T: Serialize + ?Sized>(patch: &T) -> Result<Value, MergePatchError> {
    serde_json::to_value(patch).map_err(MergePatchError::InvalidPatch)
}

/// Returns `existing` with `patch` applied, leaving both inputs untouched.
pub fn merged(existing: &Value, patch: &Value) -> Value {
    let mut target = existing.clone();
    apply(&mut target, patch);
    target
}

/// Applies `patch` to `target` in place.
pub fn apply(target: &mut Value, patch: &Value) {
    let Value::Object(patch_fields) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_fields) = target else {
        return;
    };

    for (key, value) in patch_fields {
        if value.is_null() {
            target_fields.remove(key);
            continue;
        }
        match target_fields.get_mut(key) {
            Some(existing) => apply(existing, value),
            None => {
                let mut fresh = Value::Null;
                apply(&mut fresh, value);
                target_fields.insert(key.clone(), fresh);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Nested {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        nested_string: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Record {
        #[serde(skip_serializing_if = "Option::is_none")]
        test_string: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        test_int: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        test_bool: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        test_nested_object: Option<Nested>,
        #[serde(skip_serializing_if = "Option::is_none")]
        test_array_primitive: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        test_array_object: Option<Vec<Nested>>,
    }

    fn nested(value: &str) -> Nested {
        Nested {
            nested_string: value.to_string(),
        }
    }

    fn full(suffix: &str) -> Record {
        Record {
            test_string: Some(suffix.to_string()),
            test_int: Some(suffix.len() as i64),
            test_bool: Some(suffix == "bar"),
            test_nested_object: Some(nested(&format!("nested{suffix}"))),
            test_array_primitive: Some(vec![format!("array{suffix}")]),
            test_array_object: Some(vec![nested(&format!("arraynested{suffix}"))]),
        }
    }

    fn patched(existing: &Record, patch: &impl Serialize) -> Record {
        let existing = serde_json::to_vec(existing).unwrap();
        let merged = patch_object(&existing, patch).unwrap();
        serde_json::from_slice(&merged).unwrap()
    }

    #[test]
    fn patch_over_unset_fields() {
        assert_eq!(patched(&Record::default(), &full("foo")), full("foo"));
    }

    #[test]
    fn patch_over_already_set_fields() {
        assert_eq!(patched(&full("foo"), &full("bar")), full("bar"));
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let patch = Record {
            test_int: Some(2),
            test_bool: Some(true),
            test_array_primitive: Some(vec!["arraybar".into()]),
            test_array_object: Some(vec![nested("arraynestedbar")]),
            ..Record::default()
        };

        let mut want = full("foo");
        want.test_int = Some(2);
        want.test_bool = Some(true);
        want.test_array_primitive = Some(vec!["arraybar".into()]);
        want.test_array_object = Some(vec![nested("arraynestedbar")]);

        assert_eq!(patched(&full("foo"), &patch), want);
    }

    #[test]
    fn null_unsets_a_field() {
        let existing = Record {
            test_array_primitive: Some(vec!["arraybar".into()]),
            ..Record::default()
        };
        let patch = json!({ "testArrayPrimitive": null });
        assert_eq!(patched(&existing, &patch), Record::default());
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let out = merged(&json!({"a": {"x": 1, "y": 2}}), &json!({"a": {"x": 9}}));
        assert_eq!(out, json!({"a": {"x": 9, "y": 2}}));
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let out = merged(&json!({"a": [1, 2]}), &json!({"a": [3]}));
        assert_eq!(out, json!({"a": [3]}));
    }

    #[test]
    fn keys_only_in_existing_survive() {
        let out = merged(
            &json!({"keep": {"deep": true}, "swap": "old"}),
            &json!({"swap": "new", "added": 1}),
        );
        assert_eq!(out, json!({"keep": {"deep": true}, "swap": "new", "added": 1}));
    }

    #[test]
    fn object_replaces_scalar_and_drops_nested_nulls() {
        let out = merged(&json!({"a": 5}), &json!({"a": {"b": 1, "c": null}}));
        assert_eq!(out, json!({"a": {"b": 1}}));
    }

    #[test]
    fn nested_null_deletes_only_the_nested_key() {
        let out = merged(
            &json!({"scheduled": {"operationTime": "t", "repeat": 60}}),
            &json!({"scheduled": {"operationTime": null}}),
        );
        assert_eq!(out, json!({"scheduled": {"repeat": 60}}));
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let cases = [
            (json!({"a": {"x": 1}, "b": [1]}), json!({"a": {"x": null, "y": 2}, "b": [2, 3]})),
            (json!("scalar"), json!({"k": {"n": null}})),
            (json!({"a": 1}), json!(null)),
            (json!({"a": {"b": {"c": 1}}}), json!({"a": {"b": {"d": [null]}}})),
        ];
        for (existing, patch) in cases {
            let once = merged(&existing, &patch);
            let twice = merged(&once, &patch);
            assert_eq!(once, twice, "patch {patch} over {existing}");
        }
    }

    #[test]
    fn malformed_input_reports_the_offending_side() {
        assert!(matches!(
            merge(b"{not json", b"{}"),
            Err(MergePatchError::InvalidExisting(_))
        ));
        assert!(matches!(
            merge(b"{}", b"[1,"),
            Err(MergePatchError::InvalidPatch(_))
        ));
    }

    #[test]
    fn byte_level_merge_round_trips() {
        let out = merge(br#"{"id":"a","findingsProcessed":false}"#, br#"{"findingsProcessed":true}"#)
            .unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value, json!({"id": "a", "findingsProcessed": true}));
    }
}
