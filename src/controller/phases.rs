//! Machine reconciliation phases
//!
//! The heavy lifting of a Machine pass: the generic external-object
//! reconciler, the bootstrap and infrastructure orchestrators layered on
//! it, and the phase derivation that runs last against the fully-updated
//! status.
//!
//! Everything here mutates the in-memory Machine only; the caller persists
//! the result in one place after all phases ran. Every step is idempotent,
//! so a pass interrupted at any await point is safe to re-run from scratch.

use chrono::Utc;
use kube::ResourceExt;
use tracing::{debug, error};

use super::machine::Context;
use crate::crd::{Cluster, Machine, MachineFailureReason, MachinePhase, ObjectReference};
use crate::external::{self, gateway, patch::PatchHelper, ReconcileOutput};
use crate::Error;

/// Reconcile one provider-owned external object referenced by a Machine
///
/// Normalizes and fetches the reference, honors pause, adopts the object
/// (controller owner reference + cluster membership label) through a
/// minimal merge patch, registers a watch on its kind, and copies any
/// provider failure signal onto the Machine's status.
///
/// A missing object is an [`Error::ExternalNotFound`] carrying the
/// configured retry delay: usually a creation race, so callers keep
/// retrying unless they know better (see
/// [`reconcile_infrastructure`]).
pub async fn reconcile_external(
    ctx: &Context,
    cluster: &Cluster,
    machine: &mut Machine,
    reference: &ObjectReference,
) -> Result<ReconcileOutput, Error> {
    let reference = gateway::normalize_reference(reference)?;
    let namespace = machine.namespace().unwrap_or_default();

    let Some(obj) = ctx.external.get(&reference, &namespace).await? else {
        return Err(Error::ExternalNotFound {
            api_version: reference.api_version.clone(),
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            namespace,
            after: ctx.external_ready_wait,
        });
    };

    if external::is_paused(cluster, &obj.metadata) {
        debug!(object = %reference, "external object referenced is paused");
        return Ok(ReconcileOutput {
            result: None,
            paused: true,
        });
    }

    let helper = PatchHelper::new(&obj)?;
    let mut obj = obj;
    external::patch::set_controller_reference(machine, &mut obj)?;
    external::patch::ensure_cluster_label(&mut obj, &machine.spec.cluster_name);
    helper
        .commit(ctx.external.as_ref(), &reference, &namespace, &obj)
        .await?;

    ctx.watches.ensure_watch(&reference)?;

    let (failure_reason, failure_message) = external::failures_from(&obj)?;
    if let Some(reason) = failure_reason {
        machine.status_mut().failure_reason = Some(reason);
    }
    if let Some(message) = failure_message {
        machine.status_mut().failure_message = Some(format!(
            "Failure detected from referenced resource {}/{} with name {:?}: {}",
            reference.api_version, reference.kind, reference.name, message
        ));
    }

    Ok(ReconcileOutput {
        result: Some(obj),
        paused: false,
    })
}

/// Reconcile the Machine's bootstrap provider object
///
/// A Machine without a bootstrap reference has its bootstrap data supplied
/// out of band and is left alone. Otherwise the provider object is adopted
/// and, once it reports ready, its data secret name is copied onto the
/// Machine and bootstrap is marked ready.
pub async fn reconcile_bootstrap(
    ctx: &Context,
    cluster: &Cluster,
    machine: &mut Machine,
) -> Result<(), Error> {
    let Some(config_ref) = machine.spec.bootstrap.config_ref.clone() else {
        return Ok(());
    };

    let name = machine.name_any();
    let namespace = machine.namespace().unwrap_or_default();

    let output = reconcile_external(ctx, cluster, machine, &config_ref).await?;
    if output.paused {
        return Ok(());
    }
    let Some(bootstrap_config) = output.result else {
        return Ok(());
    };

    // The data secret is already known; no need to wait on the provider.
    if machine.spec.bootstrap.data_secret_name.is_some() {
        machine.status_mut().bootstrap_ready = true;
        return Ok(());
    }

    // The provider object is going away; don't act on a vanishing resource.
    if bootstrap_config.metadata.deletion_timestamp.is_some() {
        return Ok(());
    }

    if !external::is_ready(&bootstrap_config)? {
        return Err(Error::retry_after(
            ctx.external_ready_wait,
            format!(
                "bootstrap provider for Machine {:?} in namespace {:?} is not ready",
                name, namespace
            ),
        ));
    }

    let secret_name = external::data_secret_name(&bootstrap_config).map_err(|e| {
        Error::validation(format!(
            "failed to retrieve dataSecretName from bootstrap provider for Machine {:?} in namespace {:?}: {}",
            name, namespace, e
        ))
    })?;
    let secret_name = match secret_name {
        Some(secret_name) if !secret_name.is_empty() => secret_name,
        _ => {
            // A ready provider with no secret is violating its contract;
            // waiting will not fix it.
            return Err(Error::validation(format!(
                "retrieved empty dataSecretName from bootstrap provider for Machine {:?} in namespace {:?}",
                name, namespace
            )));
        }
    };

    machine.spec.bootstrap.data = None;
    machine.spec.bootstrap.data_secret_name = Some(secret_name);
    machine.status_mut().bootstrap_ready = true;
    Ok(())
}

/// Reconcile the Machine's infrastructure provider object
///
/// Unlike bootstrap, the infrastructure reference is mandatory. A provider
/// object that vanishes *after* reporting ready marks the Machine failed:
/// that is unrecoverable external state, not a creation race.
pub async fn reconcile_infrastructure(
    ctx: &Context,
    cluster: &Cluster,
    machine: &mut Machine,
) -> Result<(), Error> {
    let name = machine.name_any();
    let namespace = machine.namespace().unwrap_or_default();
    let infra_ref = machine.spec.infrastructure_ref.clone();

    let output = match reconcile_external(ctx, cluster, machine, &infra_ref).await {
        Ok(output) => output,
        Err(err) => {
            if machine.status().infrastructure_ready && err.is_external_not_found() {
                // Infra object went missing after the machine was up and running.
                error!(
                    error = %err,
                    "infrastructure reference has been deleted after being ready, setting failure state"
                );
                let status = machine.status_mut();
                status.failure_reason =
                    Some(MachineFailureReason::InvalidConfiguration.to_string());
                status.failure_message = Some(format!(
                    "Infrastructure resource {}/{} with name {:?} has been deleted after being ready",
                    infra_ref.api_version, infra_ref.kind, infra_ref.name
                ));
            }
            return Err(err);
        }
    };
    if output.paused {
        return Ok(());
    }
    let Some(infra_config) = output.result else {
        return Ok(());
    };

    if infra_config.metadata.deletion_timestamp.is_some() {
        return Ok(());
    }

    let ready = external::is_ready(&infra_config)?;
    machine.status_mut().infrastructure_ready = ready;
    if !ready {
        return Err(Error::retry_after(
            ctx.external_ready_wait,
            format!(
                "infrastructure provider for Machine {:?} in namespace {:?} is not ready",
                name, namespace
            ),
        ));
    }

    let provider_id = external::provider_id(&infra_config).map_err(|e| {
        Error::validation(format!(
            "failed to retrieve providerID from infrastructure provider for Machine {:?} in namespace {:?}: {}",
            name, namespace, e
        ))
    })?;
    let provider_id = match provider_id {
        Some(provider_id) if !provider_id.is_empty() => provider_id,
        _ => {
            return Err(Error::validation(format!(
                "retrieved empty providerID from infrastructure provider for Machine {:?} in namespace {:?}",
                name, namespace
            )));
        }
    };

    match external::addresses(&infra_config) {
        Ok(Some(addresses)) => machine.status_mut().addresses = addresses,
        // Some providers never report addresses.
        Ok(None) => {}
        Err(e) => {
            return Err(Error::validation(format!(
                "failed to retrieve addresses from infrastructure provider for Machine {:?} in namespace {:?}: {}",
                name, namespace, e
            )));
        }
    }

    match external::failure_domain(&infra_config) {
        Ok(Some(failure_domain)) => machine.spec.failure_domain = Some(failure_domain),
        Ok(None) => {}
        Err(e) => {
            return Err(Error::validation(format!(
                "failed to retrieve failureDomain from infrastructure provider for Machine {:?} in namespace {:?}: {}",
                name, namespace, e
            )));
        }
    }

    machine.spec.provider_id = Some(provider_id);
    Ok(())
}

/// Derive the Machine's lifecycle phase from the rest of its status
///
/// Pure over the Machine's own fields: no I/O, never fails. The rules are
/// evaluated top to bottom and each later rule describes a strictly more
/// advanced state, so the last matching rule wins — a Machine that is both
/// failed and deleting presents as Deleting. Stamps `last_updated` only
/// when the phase actually changed.
pub fn reconcile_phase(machine: &mut Machine) {
    let deleting = machine.metadata.deletion_timestamp.is_some();
    let status = machine.status_mut();
    let original = status.phase.clone();

    // An unset phase reads as Pending via the enum default.
    let mut phase = original.clone();

    if status.bootstrap_ready && !status.infrastructure_ready {
        phase = MachinePhase::Provisioning;
    }

    if status.node_ref.is_some() {
        phase = MachinePhase::Provisioned;
    }

    if status.node_ref.is_some() && status.infrastructure_ready {
        phase = MachinePhase::Running;
    }

    if status.failure_reason.is_some() || status.failure_message.is_some() {
        phase = MachinePhase::Failed;
    }

    if deleting {
        phase = MachinePhase::Deleting;
    }

    if phase != original {
        status.phase = phase;
        status.last_updated = Some(Utc::now());
    }
}
