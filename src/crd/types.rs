//! Shared types used across Foundry CRDs

use kube::api::GroupVersionKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase of a Machine
///
/// The phase is derived from the rest of the Machine status after every
/// reconciliation pass; it is never written independently.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MachinePhase {
    /// Machine exists but neither provider has produced anything yet
    #[default]
    Pending,
    /// Bootstrap data is ready and infrastructure is being created
    Provisioning,
    /// Infrastructure produced a node that has not joined yet
    Provisioned,
    /// Machine is backed by a node and its infrastructure is ready
    Running,
    /// Machine is being deleted
    Deleting,
    /// Machine hit a terminal failure and needs operator intervention
    Failed,
}

impl std::fmt::Display for MachinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Provisioned => write!(f, "Provisioned"),
            Self::Running => write!(f, "Running"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Failure reasons this controller records on a Machine
///
/// Providers report their own free-form reasons, which are copied to the
/// status verbatim; this enum covers the reasons Foundry itself writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineFailureReason {
    /// The Machine references external state that can no longer be valid,
    /// e.g. an infrastructure object that vanished after being ready
    InvalidConfiguration,
}

impl std::fmt::Display for MachineFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration => write!(f, "InvalidConfiguration"),
        }
    }
}

/// Address type reported by an infrastructure provider
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MachineAddressType {
    /// Hostname of the machine
    Hostname,
    /// Externally routable IP address
    #[serde(rename = "ExternalIP")]
    ExternalIp,
    /// Cluster-internal IP address
    #[serde(rename = "InternalIP")]
    InternalIp,
    /// Externally resolvable DNS name
    #[serde(rename = "ExternalDNS")]
    ExternalDns,
    /// Cluster-internal DNS name
    #[serde(rename = "InternalDNS")]
    InternalDns,
}

/// A single address record copied from the infrastructure provider
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct MachineAddress {
    /// Kind of address (hostname, internal/external IP or DNS)
    #[serde(rename = "type")]
    pub type_: MachineAddressType,
    /// The address value
    pub address: String,
}

/// Back-reference to the cluster node realized for a Machine
///
/// Set by the node-attachment flow outside this controller; its presence
/// drives the Provisioned and Running phases.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeReference {
    /// Name of the node object
    pub name: String,
}

/// Reference to a provider-owned external object
///
/// Deliberately minimal: enough to locate the object, nothing about its
/// schema. The referenced kind is unknown to this operator at compile time.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// apiVersion of the referenced object, e.g. `bootstrap.foundry.dev/v1alpha1`
    pub api_version: String,
    /// Kind of the referenced object
    pub kind: String,
    /// Name of the referenced object
    pub name: String,
    /// Namespace of the referenced object; defaults to the Machine's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    /// Split the apiVersion into (group, version)
    ///
    /// Core-group references ("v1") yield an empty group.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }

    /// The GroupVersionKind this reference points at
    pub fn to_gvk(&self) -> GroupVersionKind {
        let (group, version) = self.group_version();
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

impl std::fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} {:?}", self.api_version, self.kind, self.name)
    }
}
