//! Fetching and patching external objects by reference
//!
//! References name a (group, version, kind, namespace, name); the concrete
//! type is unknown at compile time, so everything here goes through
//! [`DynamicObject`]. Fetches normalize the reference against the supported
//! API contract first, and report "not found" as a value rather than an
//! error so callers can classify it themselves.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;

use crate::crd::ObjectReference;
use crate::Error;

/// Contract versions this operator can reconcile against
///
/// References carrying any other version are rejected before fetch; a
/// provider shipping a newer contract needs an operator upgrade, not a
/// retry loop.
pub const SUPPORTED_CONTRACT_VERSIONS: &[&str] = &["v1alpha1"];

/// Validate a reference's apiVersion against the supported contract
///
/// Returns the reference to use for the fetch. Today this is a pure check;
/// the indirection is the seam where a future contract bump rewrites the
/// version in place.
pub fn normalize_reference(reference: &ObjectReference) -> Result<ObjectReference, Error> {
    let (_, version) = reference.group_version();
    if version.is_empty() {
        return Err(Error::UnsupportedContract(reference.api_version.clone()));
    }
    if !SUPPORTED_CONTRACT_VERSIONS.contains(&version) {
        return Err(Error::UnsupportedContract(reference.api_version.clone()));
    }
    Ok(reference.clone())
}

/// Convert a Kind to its plural form for Kubernetes API resources
///
/// Kubernetes pluralizes kinds as all-lowercase with standard English
/// suffix rules; provider kinds follow the same convention.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        // policy -> policies, but not gateway -> gateways
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Build the dynamic ApiResource for a reference
pub fn api_resource(reference: &ObjectReference) -> ApiResource {
    let gvk = reference.to_gvk();
    let plural = pluralize_kind(&gvk.kind);
    ApiResource::from_gvk_with_plural(&gvk, &plural)
}

/// Trait abstracting dynamic-object operations against the API server
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExternalObjects: Send + Sync {
    /// Fetch the object a reference points at
    ///
    /// Returns `Ok(None)` when the object does not exist; any other API
    /// failure propagates.
    async fn get(
        &self,
        reference: &ObjectReference,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Apply a merge patch to the referenced object
    ///
    /// The patch carries only changed fields plus the resourceVersion it
    /// was computed against, so a concurrent writer surfaces as a conflict
    /// instead of a silent overwrite.
    async fn patch(
        &self,
        reference: &ObjectReference,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error>;
}

/// Real implementation of [`ExternalObjects`] backed by a kube client
pub struct ExternalObjectsImpl {
    client: Client,
}

impl ExternalObjectsImpl {
    /// Create a new gateway wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, reference: &ObjectReference, namespace: &str) -> Api<DynamicObject> {
        let ar = api_resource(reference);
        Api::namespaced_with(self.client.clone(), namespace, &ar)
    }
}

#[async_trait]
impl ExternalObjects for ExternalObjectsImpl {
    async fn get(
        &self,
        reference: &ObjectReference,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        match self.api(reference, namespace).get(&reference.name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch(
        &self,
        reference: &ObjectReference,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error> {
        self.api(reference, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
