//! JSON Patch (RFC 6902) generation for state synchronisation.
//!
//! Only `add`, `remove` and `replace` are produced. Objects are diffed key
//! by key; any other changed value, arrays included, is replaced whole.

use serde::Serialize;
use serde_json::Value;

/// One patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

/// Operations turning `old` into `new`. Empty when they are equal.
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_into(&mut ops, String::new(), old, new);
    ops
}

fn diff_into(ops: &mut Vec<PatchOperation>, path: String, old: &Value, new: &Value) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            for key in old.keys().filter(|key| !new.contains_key(*key)) {
                ops.push(PatchOperation::Remove {
                    path: child_path(&path, key),
                });
            }
            for (key, value) in new {
                let child = child_path(&path, key);
                match old.get(key) {
                    Some(previous) => diff_into(ops, child, previous, value),
                    None => ops.push(PatchOperation::Add {
                        path: child,
                        value: value.clone(),
                    }),
                }
            }
        }
        _ => ops.push(PatchOperation::Replace {
            path,
            value: new.clone(),
        }),
    }
}

fn child_path(parent: &str, key: &str) -> String {
    format!("{}/{}", parent, key.replace('~', "~0").replace('/', "~1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Minimal patch application, enough to check generated patches.
    fn apply(target: &mut Value, ops: &[PatchOperation]) {
        for op in ops {
            match op {
                PatchOperation::Add { path, value } | PatchOperation::Replace { path, value } => {
                    set(target, path, value.clone())
                }
                PatchOperation::Remove { path } => {
                    let (parent, key) = split(path);
                    if let Some(obj) = target.pointer_mut(&parent).and_then(Value::as_object_mut) {
                        obj.remove(&key);
                    }
                }
            }
        }
    }

    fn set(target: &mut Value, path: &str, value: Value) {
        if path.is_empty() {
            *target = value;
            return;
        }
        let (parent, key) = split(path);
        if let Some(obj) = target.pointer_mut(&parent).and_then(Value::as_object_mut) {
            obj.insert(key, value);
        }
    }

    fn split(path: &str) -> (String, String) {
        let idx = path.rfind('/').unwrap();
        let key = path[idx + 1..].replace("~1", "/").replace("~0", "~");
        (path[..idx].to_string(), key)
    }

    #[test]
    fn equal_values_give_no_operations() {
        assert!(diff(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})).is_empty());
    }

    #[test]
    fn root_replacement_uses_empty_path() {
        assert_eq!(
            diff(&Value::Null, &json!({})),
            vec![PatchOperation::Replace {
                path: String::new(),
                value: json!({})
            }]
        );
    }

    #[test]
    fn nested_changes_are_minimal() {
        let old = json!({"a": {"x": 1, "y": 2}, "b": 1});
        let new = json!({"a": {"x": 1, "y": 3}, "c": true});

        let ops = diff(&old, &new);

        assert_eq!(
            ops,
            vec![
                PatchOperation::Remove { path: "/b".to_string() },
                PatchOperation::Replace {
                    path: "/a/y".to_string(),
                    value: json!(3)
                },
                PatchOperation::Add {
                    path: "/c".to_string(),
                    value: json!(true)
                },
            ]
        );
    }

    #[test]
    fn keys_are_escaped() {
        let ops = diff(&json!({}), &json!({"a/b~c": 1}));
        assert_eq!(
            ops,
            vec![PatchOperation::Add {
                path: "/a~1b~0c".to_string(),
                value: json!(1)
            }]
        );
    }

    #[test]
    fn serialized_form_follows_rfc6902() {
        let op = PatchOperation::Remove { path: "/x".to_string() };
        assert_eq!(serde_json::to_value(op).unwrap(), json!({"op": "remove", "path": "/x"}));
    }

    #[test]
    fn applying_diff_reproduces_new_value() {
        let old = json!({"adapter": {"k": {"v": 1}}, "gone": [1], "s": "x"});
        let new = json!({"adapter": {"k": {"v": 2, "w": null}}, "s": ["y"], "n/ew": {}});

        let mut replica = old.clone();
        apply(&mut replica, &diff(&old, &new));

        assert_eq!(replica, new);
    }
}
