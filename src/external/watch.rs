//! Watch registration from external kinds back to Machines
//!
//! The concrete provider kinds are only discovered at reconcile time, so
//! watches are registered lazily: the first Machine that references a kind
//! spawns a watcher task for it. Events on watched objects map back to
//! their owning Machines through owner references and feed the controller's
//! re-enqueue stream.

use dashmap::DashSet;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource};
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::gateway;
use crate::crd::{Machine, ObjectReference};
use crate::Error;

/// Trait abstracting watch registration for external kinds
///
/// This trait allows mocking watch registration in tests while using the
/// real watcher-spawning registrar in production.
#[cfg_attr(test, automock)]
pub trait ExternalWatches: Send + Sync {
    /// Ensure a watch exists from the referenced kind back to Machines
    ///
    /// Idempotent; registering an already-watched kind is a no-op.
    fn ensure_watch(&self, reference: &ObjectReference) -> Result<(), Error>;
}

/// Real registrar that spawns one watcher task per external kind
pub struct ExternalWatcher {
    client: Client,
    trigger: mpsc::Sender<ObjectRef<Machine>>,
    registered: DashSet<String>,
}

impl ExternalWatcher {
    /// Create a registrar feeding the given re-enqueue channel
    pub fn new(client: Client, trigger: mpsc::Sender<ObjectRef<Machine>>) -> Self {
        Self {
            client,
            trigger,
            registered: DashSet::new(),
        }
    }
}

impl ExternalWatches for ExternalWatcher {
    fn ensure_watch(&self, reference: &ObjectReference) -> Result<(), Error> {
        let key = format!("{}/{}", reference.api_version, reference.kind);
        if !self.registered.insert(key) {
            return Ok(());
        }

        let ar = gateway::api_resource(reference);
        debug!(
            kind = %ar.kind,
            group = %ar.group,
            "registering watch on external kind"
        );

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            let stream = watcher(api, watcher::Config::default());
            futures::pin_mut!(stream);
            while let Some(event) = stream.next().await {
                match event {
                    Ok(watcher::Event::Apply(obj))
                    | Ok(watcher::Event::InitApply(obj))
                    | Ok(watcher::Event::Delete(obj)) => {
                        for owner in machine_owners(&obj) {
                            if trigger.send(owner).await.is_err() {
                                // Controller shut down; stop watching.
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "external watch stream error"),
                }
            }
        });

        Ok(())
    }
}

/// Machines owning `obj`, resolved through its owner references
fn machine_owners(obj: &DynamicObject) -> Vec<ObjectRef<Machine>> {
    let group_prefix = format!("{}/", crate::API_GROUP);
    let namespace = obj.metadata.namespace.clone();

    obj.metadata
        .owner_references
        .iter()
        .flatten()
        .filter(|r| r.kind == Machine::kind(&()) && r.api_version.starts_with(&group_prefix))
        .map(|r| {
            let mut owner = ObjectRef::new(&r.name);
            if let Some(ns) = &namespace {
                owner = owner.within(ns);
            }
            owner
        })
        .collect()
}
