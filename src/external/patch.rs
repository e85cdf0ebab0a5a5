//! Adoption and only-what-changed commits for external objects
//!
//! External objects are owned by their provider controllers; this operator
//! adopts a controller reference and a membership label on them, nothing
//! more. Commits go through a captured-baseline merge patch: only fields
//! that actually changed are written, pinned to the resourceVersion the
//! diff was computed against so concurrent writers surface as conflicts.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use serde_json::Value;

use super::gateway::ExternalObjects;
use crate::crd::{Machine, ObjectReference};
use crate::Error;

/// Compute the JSON merge patch turning `base` into `modified`
///
/// Returns `None` when the documents are equal. Removed fields become
/// explicit nulls; arrays are replaced wholesale, per merge-patch
/// semantics.
pub fn merge_diff(base: &Value, modified: &Value) -> Option<Value> {
    if base == modified {
        return None;
    }
    match (base, modified) {
        (Value::Object(base_map), Value::Object(modified_map)) => {
            let mut out = serde_json::Map::new();
            for (key, modified_value) in modified_map {
                match base_map.get(key) {
                    Some(base_value) => {
                        if let Some(diff) = merge_diff(base_value, modified_value) {
                            out.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        out.insert(key.clone(), modified_value.clone());
                    }
                }
            }
            for key in base_map.keys() {
                if !modified_map.contains_key(key) {
                    out.insert(key.clone(), Value::Null);
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        _ => Some(modified.clone()),
    }
}

/// Captures an object's state so later mutations commit as a minimal patch
pub struct PatchHelper {
    before: Value,
}

impl PatchHelper {
    /// Capture the baseline state of `obj`
    pub fn new(obj: &DynamicObject) -> Result<Self, Error> {
        let before =
            serde_json::to_value(obj).map_err(|e| Error::serialization(e.to_string()))?;
        Ok(Self { before })
    }

    /// Commit everything that changed on `obj` since capture
    ///
    /// A no-op when nothing changed. The patch pins the baseline
    /// resourceVersion, so a write that raced another client fails with a
    /// conflict and the pass re-runs against fresh state.
    pub async fn commit(
        self,
        objects: &dyn ExternalObjects,
        reference: &ObjectReference,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<(), Error> {
        let after = serde_json::to_value(obj).map_err(|e| Error::serialization(e.to_string()))?;
        let Some(mut diff) = merge_diff(&self.before, &after) else {
            return Ok(());
        };

        if let (Some(Value::String(rv)), Value::Object(diff_map)) = (
            self.before.pointer("/metadata/resourceVersion"),
            &mut diff,
        ) {
            let metadata = diff_map
                .entry("metadata")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(metadata) = metadata {
                metadata.insert("resourceVersion".to_string(), Value::String(rv.clone()));
            }
        }

        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::validation("cannot patch an unnamed external object"))?;
        objects.patch(reference, namespace, &name, diff).await
    }
}

/// Adopt `obj` under `owner` with a controller owner reference
///
/// Idempotent: re-adopting under the same owner rewrites the reference in
/// place. An existing controller reference to a different owner is an
/// error; two controllers must never fight over one object.
pub fn set_controller_reference(owner: &Machine, obj: &mut DynamicObject) -> Result<(), Error> {
    let uid = owner.uid().ok_or_else(|| {
        Error::validation(format!(
            "Machine {:?} has no UID and cannot own external objects",
            owner.name_any()
        ))
    })?;

    let owner_ref = OwnerReference {
        api_version: Machine::api_version(&()).to_string(),
        kind: Machine::kind(&()).to_string(),
        name: owner.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    let obj_name = obj.name_any();
    let refs = obj.metadata.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.controller == Some(true)) {
        Some(existing) if existing.uid == owner_ref.uid => {
            *existing = owner_ref;
        }
        Some(existing) => {
            return Err(Error::validation(format!(
                "object {:?} is already controlled by {} {:?}",
                obj_name,
                existing.kind,
                existing.name
            )));
        }
        None => refs.push(owner_ref),
    }
    Ok(())
}

/// Merge the cluster-membership label onto `obj`, preserving other labels
pub fn ensure_cluster_label(obj: &mut DynamicObject, cluster_name: &str) {
    obj.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(
            crate::CLUSTER_NAME_LABEL.to_string(),
            cluster_name.to_string(),
        );
}
