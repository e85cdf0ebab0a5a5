//! Generic handling of provider-owned external objects
//!
//! A Machine delegates bootstrap and infrastructure to objects this operator
//! does not define: it only knows the narrow structural contract providers
//! follow (`status.ready`, `status.failureReason`, `spec.providerID`, ...).
//! This module holds that contract plus the machinery around it: the
//! [`accessor`] for schema-less field reads, the [`gateway`] for fetching and
//! patching by reference, the [`patch`] helpers for adoption and
//! only-what-changed commits, and the [`watch`] registrar that re-enqueues
//! Machines when their provider objects change.

pub mod accessor;
pub mod gateway;
pub mod patch;
pub mod watch;

use kube::api::{DynamicObject, ObjectMeta};

use crate::crd::{Cluster, MachineAddress};
use accessor::AccessError;

/// Result of running the generic external reconciler over one reference
///
/// Transient: produced and consumed within a single reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileOutput {
    /// The fetched (and possibly patched) external object; `None` when the
    /// pass short-circuited before fetching completed its work
    pub result: Option<DynamicObject>,
    /// True if reconciliation was skipped because the object is paused
    pub paused: bool,
}

/// Whether the provider reports this object ready
///
/// An absent `status.ready` reads as not ready; providers flip it exactly
/// once their output is usable.
pub fn is_ready(obj: &DynamicObject) -> Result<bool, AccessError> {
    Ok(accessor::nested_bool(&obj.data, &["status", "ready"])?.unwrap_or(false))
}

/// Failure reason and message reported by the provider, if any
pub fn failures_from(
    obj: &DynamicObject,
) -> Result<(Option<String>, Option<String>), AccessError> {
    let reason = accessor::nested_string(&obj.data, &["status", "failureReason"])?;
    let message = accessor::nested_string(&obj.data, &["status", "failureMessage"])?;
    Ok((reason, message))
}

/// Name of the bootstrap data secret produced by a bootstrap provider
pub fn data_secret_name(obj: &DynamicObject) -> Result<Option<String>, AccessError> {
    accessor::nested_string(&obj.data, &["status", "dataSecretName"])
}

/// Provider-assigned machine identifier from an infrastructure object
pub fn provider_id(obj: &DynamicObject) -> Result<Option<String>, AccessError> {
    accessor::nested_string(&obj.data, &["spec", "providerID"])
}

/// Addresses reported by an infrastructure provider
///
/// Not every provider populates addresses; absence is a valid outcome.
pub fn addresses(obj: &DynamicObject) -> Result<Option<Vec<MachineAddress>>, AccessError> {
    accessor::nested(&obj.data, &["status", "addresses"])
}

/// Failure domain the infrastructure provider placed the machine in
pub fn failure_domain(obj: &DynamicObject) -> Result<Option<String>, AccessError> {
    accessor::nested_string(&obj.data, &["spec", "failureDomain"])
}

/// Whether reconciliation of `meta`'s object is paused
///
/// Pause is honored from either direction: the owning Cluster's
/// `spec.paused`, or the pause annotation on the object itself. The
/// annotation's value is irrelevant; presence pauses.
pub fn is_paused(cluster: &Cluster, meta: &ObjectMeta) -> bool {
    if cluster.spec.paused {
        return true;
    }
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(crate::PAUSED_ANNOTATION))
}
