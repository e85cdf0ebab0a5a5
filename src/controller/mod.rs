//! Kubernetes controller reconciliation logic

mod machine;
mod phases;

pub use machine::{
    error_policy, reconcile, Context, ContextBuilder, KubeClient, KubeClientImpl,
};
pub use phases::{
    reconcile_bootstrap, reconcile_external, reconcile_infrastructure, reconcile_phase,
};
