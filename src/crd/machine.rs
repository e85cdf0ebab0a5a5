//! Machine Custom Resource Definition
//!
//! A Machine represents one managed compute node. Its spec points at a
//! bootstrap provider object and an infrastructure provider object; its
//! status mirrors what those providers have produced so far, plus the
//! derived lifecycle phase.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{MachineAddress, MachinePhase, NodeReference, ObjectReference};

/// Specification for a Machine
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "foundry.dev",
    version = "v1alpha1",
    kind = "Machine",
    plural = "machines",
    shortname = "ma",
    status = "MachineStatus",
    namespaced,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ProviderID","type":"string","jsonPath":".spec.providerID"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the Cluster this Machine belongs to
    pub cluster_name: String,

    /// Bootstrap provider configuration for this Machine
    #[serde(default)]
    pub bootstrap: BootstrapSpec,

    /// Reference to the infrastructure provider object backing this Machine
    pub infrastructure_ref: ObjectReference,

    /// Provider-assigned identifier, copied from the infrastructure object
    /// once it is ready (e.g. `aws:///i-0123456789`)
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "providerID")]
    pub provider_id: Option<String>,

    /// Failure domain the infrastructure provider placed this Machine in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,
}

/// Bootstrap configuration for a Machine
///
/// Either `config_ref` points at a bootstrap provider object that will
/// produce a data secret, or `data_secret_name`/`data` carry the bootstrap
/// payload directly.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapSpec {
    /// Reference to the bootstrap provider object, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ObjectReference>,

    /// Name of the secret holding the bootstrap data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,

    /// Inline bootstrap data; superseded by `data_secret_name` once the
    /// provider reports a secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Status for a Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Derived lifecycle phase
    #[serde(default)]
    pub phase: MachinePhase,

    /// True once the bootstrap provider has produced usable bootstrap data
    #[serde(default)]
    pub bootstrap_ready: bool,

    /// True once the infrastructure provider reports the machine ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Reference to the node realized for this Machine, once it joined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeReference>,

    /// Terminal failure reason, if any
    ///
    /// Provider-reported reasons are copied verbatim; reasons recorded by
    /// this controller come from
    /// [`MachineFailureReason`](crate::crd::MachineFailureReason).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Human-readable terminal failure description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// When the phase last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Addresses reported by the infrastructure provider
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,
}

impl Machine {
    /// The Machine's status, defaulting to an empty one if unset
    pub fn status(&self) -> MachineStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable access to the status, initializing it if unset
    pub fn status_mut(&mut self) -> &mut MachineStatus {
        self.status.get_or_insert_with(MachineStatus::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::MachineAddressType;

    fn sample_spec() -> MachineSpec {
        MachineSpec {
            cluster_name: "prod-us-west".to_string(),
            bootstrap: BootstrapSpec {
                config_ref: Some(ObjectReference {
                    api_version: "bootstrap.foundry.dev/v1alpha1".to_string(),
                    kind: "KubeadmConfig".to_string(),
                    name: "worker-0-bootstrap".to_string(),
                    namespace: None,
                }),
                data_secret_name: None,
                data: None,
            },
            infrastructure_ref: ObjectReference {
                api_version: "infrastructure.foundry.dev/v1alpha1".to_string(),
                kind: "DockerMachine".to_string(),
                name: "worker-0-infra".to_string(),
                namespace: None,
            },
            provider_id: None,
            failure_domain: None,
        }
    }

    // =========================================================================
    // Manifest Shape Stories
    // =========================================================================
    //
    // Machines are written by users and by higher-level controllers as YAML.
    // These tests pin the wire format.

    /// Story: user defines a worker machine in a YAML manifest
    #[test]
    fn story_yaml_manifest_defines_worker_machine() {
        let yaml = r#"
clusterName: prod-us-west
bootstrap:
  configRef:
    apiVersion: bootstrap.foundry.dev/v1alpha1
    kind: KubeadmConfig
    name: worker-0-bootstrap
infrastructureRef:
  apiVersion: infrastructure.foundry.dev/v1alpha1
  kind: DockerMachine
  name: worker-0-infra
"#;
        let spec: MachineSpec = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(spec.cluster_name, "prod-us-west");
        assert_eq!(
            spec.bootstrap.config_ref.as_ref().unwrap().kind,
            "KubeadmConfig"
        );
        assert_eq!(spec.infrastructure_ref.kind, "DockerMachine");
        assert!(spec.provider_id.is_none());
    }

    /// Story: a machine with pre-baked bootstrap data needs no config ref
    ///
    /// Some machines are handed their bootstrap secret directly; the
    /// bootstrap provider round-trip is skipped entirely for those.
    #[test]
    fn story_yaml_manifest_with_inline_bootstrap_secret() {
        let yaml = r#"
clusterName: prod-us-west
bootstrap:
  dataSecretName: prebaked-bootstrap
infrastructureRef:
  apiVersion: infrastructure.foundry.dev/v1alpha1
  kind: DockerMachine
  name: worker-0-infra
"#;
        let spec: MachineSpec = serde_yaml::from_str(yaml).unwrap();

        assert!(spec.bootstrap.config_ref.is_none());
        assert_eq!(
            spec.bootstrap.data_secret_name.as_deref(),
            Some("prebaked-bootstrap")
        );
    }

    /// Story: providerID round-trips with its exact field casing
    #[test]
    fn story_provider_id_uses_exact_field_casing() {
        let mut spec = sample_spec();
        spec.provider_id = Some("aws:///i-0123456789".to_string());

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json.get("providerID").and_then(|v| v.as_str()),
            Some("aws:///i-0123456789")
        );
    }

    /// Story: fresh machines report an empty, Pending status
    #[test]
    fn story_fresh_machine_status_defaults_to_pending() {
        let machine = Machine::new("worker-0", sample_spec());

        let status = machine.status();
        assert_eq!(status.phase, MachinePhase::Pending);
        assert!(!status.bootstrap_ready);
        assert!(!status.infrastructure_ready);
        assert!(status.addresses.is_empty());
    }

    /// Story: status serialization drops empty optional fields
    ///
    /// Status patches only carry what is actually set, so an untouched
    /// status serializes to just the phase and the ready booleans.
    #[test]
    fn story_status_serialization_omits_unset_fields() {
        let mut status = MachineStatus::default();
        status.infrastructure_ready = true;
        status.addresses.push(MachineAddress {
            type_: MachineAddressType::InternalIp,
            address: "10.0.0.4".to_string(),
        });

        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("failureReason").is_none());
        assert!(json.get("nodeRef").is_none());
        assert!(json.get("lastUpdated").is_none());
        assert_eq!(json["addresses"][0]["type"], "InternalIP");
    }
}
