//! Machine controller implementation
//!
//! This module wires the reconciliation phases into a kube-runtime
//! controller: it looks up the owning Cluster, honors pause, runs bootstrap
//! and infrastructure reconciliation in deterministic order, derives the
//! phase last, and persists whatever changed as minimal merge patches.
//!
//! One Machine is processed by at most one pass at a time; distinct
//! Machines reconcile concurrently. Nothing here blocks waiting on external
//! readiness — waiting is expressed as a typed retry error that the error
//! policy turns into a delayed requeue of the same key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use super::phases;
use crate::crd::{Cluster, Machine};
use crate::external;
use crate::external::gateway::{ExternalObjects, ExternalObjectsImpl};
use crate::external::patch::merge_diff;
use crate::external::watch::{ExternalWatcher, ExternalWatches};
use crate::Error;

/// How often a settled Machine is re-checked without any trigger
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Fallback requeue for errors that carry no retry hint
const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Trait abstracting Kubernetes operations on Foundry's own resources
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a Cluster by namespace and name; `Ok(None)` when absent
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, Error>;

    /// Apply a merge patch to a Machine's main resource
    async fn patch_machine(&self, namespace: &str, name: &str, patch: Value)
        -> Result<(), Error>;

    /// Apply a merge patch to a Machine's status subresource
    async fn patch_machine_status(
        &self,
        namespace: &str,
        name: &str,
        patch: Value,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, Error> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_machine(
        &self,
        namespace: &str,
        name: &str,
        patch: Value,
    ) -> Result<(), Error> {
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_machine_status(
        &self,
        namespace: &str,
        name: &str,
        patch: Value,
    ) -> Result<(), Error> {
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Controller context containing shared state and clients
///
/// The context is shared across all reconciliation calls and holds the
/// Kubernetes-facing components behind trait objects for testability.
///
/// Use [`Context::builder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .trigger(trigger_tx)
///     .external_ready_wait(Duration::from_secs(30))
///     .build();
/// ```
pub struct Context {
    /// Client for Foundry's own resources (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Gateway for provider-owned external objects
    pub external: Arc<dyn ExternalObjects>,
    /// Watch registrar for external kinds
    pub watches: Arc<dyn ExternalWatches>,
    /// Wait before re-checking a missing or not-ready external object
    pub external_ready_wait: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom mock clients
    ///
    /// This method is primarily for unit tests where a real Kubernetes
    /// client is not available. For production code, use
    /// [`Context::builder`].
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        external: Arc<dyn ExternalObjects>,
        watches: Arc<dyn ExternalWatches>,
        external_ready_wait: Duration,
    ) -> Self {
        Self {
            kube,
            external,
            watches,
            external_ready_wait,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    external: Option<Arc<dyn ExternalObjects>>,
    watches: Option<Arc<dyn ExternalWatches>>,
    trigger: Option<mpsc::Sender<ObjectRef<Machine>>>,
    external_ready_wait: Duration,
}

impl ContextBuilder {
    /// Create a new builder with the given Kubernetes client
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            external: None,
            watches: None,
            trigger: None,
            external_ready_wait: Duration::from_secs(crate::DEFAULT_EXTERNAL_READY_WAIT_SECS),
        }
    }

    /// Set the wait before re-checking a missing or not-ready external object
    pub fn external_ready_wait(mut self, wait: Duration) -> Self {
        self.external_ready_wait = wait;
        self
    }

    /// Override the client for Foundry's own resources
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the external-object gateway
    pub fn external_objects(mut self, external: Arc<dyn ExternalObjects>) -> Self {
        self.external = Some(external);
        self
    }

    /// Override the watch registrar
    pub fn watches(mut self, watches: Arc<dyn ExternalWatches>) -> Self {
        self.watches = Some(watches);
        self
    }

    /// Set the channel that external-object events re-enqueue Machines on
    ///
    /// Without a trigger the default registrar still watches external kinds
    /// but its events go nowhere; every controller deployment sets this.
    pub fn trigger(mut self, trigger: mpsc::Sender<ObjectRef<Machine>>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Build the context, defaulting any component not overridden
    pub fn build(self) -> Context {
        let kube = self
            .kube
            .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone())));
        let external = self
            .external
            .unwrap_or_else(|| Arc::new(ExternalObjectsImpl::new(self.client.clone())));
        let watches = self.watches.unwrap_or_else(|| {
            let trigger = self.trigger.unwrap_or_else(|| mpsc::channel(1).0);
            Arc::new(ExternalWatcher::new(self.client.clone(), trigger))
        });
        Context {
            kube,
            external,
            watches,
            external_ready_wait: self.external_ready_wait,
        }
    }
}

/// Reconcile a Machine against its providers
///
/// One full pass: look up the owning Cluster, honor pause, reconcile
/// bootstrap then infrastructure, derive the phase against the fully
/// updated status, and persist what changed. Phase errors are collected so
/// a failing step never loses the status the other steps produced.
#[instrument(skip(machine, ctx), fields(machine = %machine.name_any()))]
pub async fn reconcile(machine: Arc<Machine>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = machine
        .namespace()
        .ok_or_else(|| Error::validation("Machine has no namespace"))?;
    let name = machine.name_any();

    let cluster = ctx
        .kube
        .get_cluster(&namespace, &machine.spec.cluster_name)
        .await?
        .ok_or_else(|| {
            Error::retry_after(
                ctx.external_ready_wait,
                format!(
                    "Cluster {:?} for Machine {:?} in namespace {:?} does not exist yet",
                    machine.spec.cluster_name, name, namespace
                ),
            )
        })?;

    if external::is_paused(&cluster, &machine.metadata) {
        info!("machine or cluster is paused, skipping reconciliation");
        return Ok(Action::await_change());
    }

    let mut working = machine.as_ref().clone();
    let before = working.clone();

    if working.metadata.deletion_timestamp.is_some() {
        // Teardown is finalizer-driven elsewhere; present the phase and stop.
        phases::reconcile_phase(&mut working);
        persist(&ctx, &before, &working, &namespace, &name).await?;
        return Ok(Action::await_change());
    }

    {
        let status = working.status();
        if status.failure_reason.is_some() || status.failure_message.is_some() {
            // A recorded failure is terminal. Re-running the orchestrators
            // would flap against the same broken external state; wait for an
            // operator to replace the spec instead.
            info!("machine has a terminal failure, skipping reconciliation");
            phases::reconcile_phase(&mut working);
            persist(&ctx, &before, &working, &namespace, &name).await?;
            return Ok(Action::await_change());
        }
    }

    let mut errors: Vec<Error> = Vec::new();
    if let Err(e) = phases::reconcile_bootstrap(&ctx, &cluster, &mut working).await {
        errors.push(e);
    }
    if let Err(e) = phases::reconcile_infrastructure(&ctx, &cluster, &mut working).await {
        errors.push(e);
    }

    // Phase derivation always runs last, against the fully-updated status.
    phases::reconcile_phase(&mut working);

    persist(&ctx, &before, &working, &namespace, &name).await?;

    if !errors.is_empty() {
        // A genuine failure must not be masked by a co-occurring retry signal.
        let index = errors
            .iter()
            .position(|e| e.retry_after_hint().is_none())
            .unwrap_or(0);
        return Err(errors.swap_remove(index));
    }

    debug!("machine reconciled");
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Persist everything that changed on a Machine during one pass
///
/// The main resource and the status subresource are patched separately,
/// each with a merge patch of only the changed fields; no-ops issue no
/// request at all.
async fn persist(
    ctx: &Context,
    before: &Machine,
    after: &Machine,
    namespace: &str,
    name: &str,
) -> Result<(), Error> {
    let before_json =
        serde_json::to_value(before).map_err(|e| Error::serialization(e.to_string()))?;
    let after_json =
        serde_json::to_value(after).map_err(|e| Error::serialization(e.to_string()))?;

    let strip_status = |mut value: Value| {
        if let Some(map) = value.as_object_mut() {
            map.remove("status");
        }
        value
    };

    if let Some(diff) = merge_diff(
        &strip_status(before_json.clone()),
        &strip_status(after_json.clone()),
    ) {
        ctx.kube.patch_machine(namespace, name, diff).await?;
    }

    let before_status = before_json.get("status").cloned().unwrap_or(Value::Null);
    let after_status = after_json.get("status").cloned().unwrap_or(Value::Null);
    if let Some(diff) = merge_diff(&before_status, &after_status) {
        ctx.kube
            .patch_machine_status(namespace, name, serde_json::json!({ "status": diff }))
            .await?;
    }

    Ok(())
}

/// Error policy for the Machine controller
///
/// Retry-class signals (provider not ready, object not created yet) requeue
/// with their own delay and stay out of the error log. Everything else is a
/// real failure and requeues on a short interval.
pub fn error_policy(machine: Arc<Machine>, error: &Error, _ctx: Arc<Context>) -> Action {
    match error.retry_after_hint() {
        Some(delay) => {
            debug!(
                machine = %machine.name_any(),
                %error,
                "waiting on external dependency"
            );
            Action::requeue(delay)
        }
        None => {
            error!(
                ?error,
                machine = %machine.name_any(),
                "reconciliation failed"
            );
            Action::requeue(ERROR_REQUEUE)
        }
    }
}
