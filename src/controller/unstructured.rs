//! Lookups over untyped JSON objects
//!
//! Objects read through the dynamic client have no schema guarantees, so
//! every level of a lookup may be missing. Absence is reported as `None`,
//! never as an error.

use serde_json::Value;

/// Walk `path` through nested objects
pub fn nested<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(obj, |cur, key| cur.as_object()?.get(*key))
}

/// String at `path`; missing, null or non-string values read as `None`
pub fn nested_str<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a str> {
    nested(obj, path).and_then(Value::as_str)
}

/// String at `path`, empty when absent
pub fn nested_string(obj: &Value, path: &[&str]) -> String {
    nested_str(obj, path).unwrap_or_default().to_string()
}

/// Array at `path`, empty when absent or not an array
pub fn nested_slice<'a>(obj: &'a Value, path: &[&str]) -> &'a [Value] {
    nested(obj, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_lookup() {
        let obj = json!({"spec": {"channel": "stable-4.5", "n": 3}});
        assert_eq!(nested_str(&obj, &["spec", "channel"]), Some("stable-4.5"));
        assert_eq!(nested(&obj, &["spec", "n"]), Some(&json!(3)));
    }

    #[test]
    fn test_missing_levels_are_none() {
        let obj = json!({"spec": "not-an-object"});
        assert!(nested(&obj, &["spec", "channel"]).is_none());
        assert!(nested(&obj, &["status", "desired", "version"]).is_none());
        assert_eq!(nested_string(&obj, &["status"]), "");
    }

    #[test]
    fn test_wrong_types_read_as_absent() {
        let obj = json!({"spec": {"channel": 7}, "status": {"history": {}}});
        assert!(nested_str(&obj, &["spec", "channel"]).is_none());
        assert!(nested_slice(&obj, &["status", "history"]).is_empty());
    }
}
