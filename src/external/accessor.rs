//! Structural field access over schema-less objects
//!
//! Provider objects have no compile-time schema; the controller reads them
//! through conventional paths like `status.ready`. Absence of a path is a
//! first-order outcome (`Ok(None)`), not an error: a provider that has not
//! populated a field yet must never fail the caller. Only a path that exists
//! with the wrong shape is an error.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Error from a structural field read
///
/// Deliberately does not include a "not found" variant; absence is reported
/// through `Ok(None)` so callers are forced to handle it as a normal case.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    /// The path exists but its value has the wrong shape
    #[error("field {path:?} has unexpected type (expected {expected})")]
    WrongType {
        /// Dotted path that was read
        path: String,
        /// Shape the caller asked for
        expected: String,
    },

    /// An intermediate path segment exists but is not an object, so the
    /// path cannot be descended further
    #[error("field {path:?} is not an object and cannot be descended")]
    NotAnObject {
        /// Dotted path up to and including the offending segment
        path: String,
    },
}

fn dotted(path: &[&str], upto: usize) -> String {
    path[..upto].join(".")
}

/// Read the raw value at `path`, distinguishing absence from shape errors
///
/// Returns `Ok(None)` when any segment of the path is missing, `Ok(Some)`
/// when the full path resolves, and an error only when an intermediate
/// segment resolves to a non-object.
pub fn nested_value<'a>(root: &'a Value, path: &[&str]) -> Result<Option<&'a Value>, AccessError> {
    let mut current = root;
    for (idx, segment) in path.iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            Value::Null => return Ok(None),
            _ => {
                return Err(AccessError::NotAnObject {
                    path: dotted(path, idx),
                })
            }
        };
        match map.get(*segment) {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Read a string field at `path`
pub fn nested_string(root: &Value, path: &[&str]) -> Result<Option<String>, AccessError> {
    match nested_value(root, path)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(AccessError::WrongType {
            path: dotted(path, path.len()),
            expected: "string".to_string(),
        }),
    }
}

/// Read a boolean field at `path`
pub fn nested_bool(root: &Value, path: &[&str]) -> Result<Option<bool>, AccessError> {
    match nested_value(root, path)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(AccessError::WrongType {
            path: dotted(path, path.len()),
            expected: "bool".to_string(),
        }),
    }
}

/// Read and deserialize a structured field at `path`
///
/// Used for shapes beyond scalars, e.g. the address list an infrastructure
/// provider reports.
pub fn nested<T: DeserializeOwned>(root: &Value, path: &[&str]) -> Result<Option<T>, AccessError> {
    match nested_value(root, path)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| AccessError::WrongType {
                    path: dotted(path, path.len()),
                    expected: std::any::type_name::<T>().to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider_object() -> Value {
        json!({
            "spec": {
                "providerID": "aws:///i-0123456789",
                "failureDomain": "us-west-1a",
            },
            "status": {
                "ready": true,
                "addresses": [
                    { "type": "InternalIP", "address": "10.0.0.4" },
                ],
            },
        })
    }

    /// Story: reading a populated field returns its value
    #[test]
    fn story_present_field_is_found() {
        let obj = provider_object();

        assert_eq!(
            nested_string(&obj, &["spec", "providerID"]).unwrap(),
            Some("aws:///i-0123456789".to_string())
        );
        assert_eq!(nested_bool(&obj, &["status", "ready"]).unwrap(), Some(true));
    }

    /// Story: a provider that has not populated a field yet is not an error
    ///
    /// Providers fill their status incrementally. A missing leaf, or a whole
    /// missing subtree, reads as `None` so the caller can decide whether to
    /// wait, default, or reject.
    #[test]
    fn story_absent_field_reads_as_none() {
        let obj = provider_object();

        assert_eq!(
            nested_string(&obj, &["status", "dataSecretName"]).unwrap(),
            None
        );
        assert_eq!(
            nested_string(&obj, &["status", "nested", "deeper"]).unwrap(),
            None,
            "missing intermediate segment also reads as absent"
        );
    }

    /// Story: a field with the wrong shape is a hard error
    ///
    /// `status.ready` holding a string means the provider is violating its
    /// contract; silently coercing it would mask the bug.
    #[test]
    fn story_wrong_shape_is_a_hard_error() {
        let obj = json!({ "status": { "ready": "yes" } });

        let err = nested_bool(&obj, &["status", "ready"]).unwrap_err();
        assert_eq!(
            err,
            AccessError::WrongType {
                path: "status.ready".to_string(),
                expected: "bool".to_string(),
            }
        );
    }

    /// Story: descending through a scalar is a hard error, not absence
    #[test]
    fn story_descending_through_scalar_fails() {
        let obj = json!({ "status": "not-an-object" });

        let err = nested_string(&obj, &["status", "ready"]).unwrap_err();
        assert_eq!(
            err,
            AccessError::NotAnObject {
                path: "status".to_string(),
            }
        );
    }

    /// Story: structured fields deserialize through the same tri-state read
    #[test]
    fn story_structured_field_deserializes() {
        use crate::crd::MachineAddress;

        let obj = provider_object();
        let addresses: Option<Vec<MachineAddress>> =
            nested(&obj, &["status", "addresses"]).unwrap();

        let addresses = addresses.unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].address, "10.0.0.4");

        let absent: Option<Vec<MachineAddress>> =
            nested(&obj, &["status", "machineAddresses"]).unwrap();
        assert!(absent.is_none());
    }

    /// Story: explicit null reads as absent
    ///
    /// Some providers write `null` instead of omitting a field; both mean
    /// "nothing here yet".
    #[test]
    fn story_null_reads_as_absent() {
        let obj = json!({ "status": { "dataSecretName": null } });

        assert_eq!(
            nested_string(&obj, &["status", "dataSecretName"]).unwrap(),
            None
        );
    }
}
