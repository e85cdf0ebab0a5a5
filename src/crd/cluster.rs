//! Cluster Custom Resource Definition
//!
//! The Cluster is the membership anchor for Machines: every Machine names
//! its cluster, and adopted provider objects are labeled with it. It also
//! carries the cluster-wide pause switch honored before any external
//! mutation.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "foundry.dev",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    shortname = "cl",
    namespaced,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pause reconciliation of this cluster and every Machine in it
    ///
    /// While paused, Machines are neither mutated nor are their external
    /// objects touched; work resumes when the flag is cleared.
    #[serde(default)]
    pub paused: bool,
}
