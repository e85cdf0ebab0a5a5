//! Custom Resource Definitions for Foundry

mod cluster;
mod machine;
mod types;

pub use cluster::{Cluster, ClusterSpec};
pub use machine::{BootstrapSpec, Machine, MachineSpec, MachineStatus};
pub use types::{
    MachineAddress, MachineAddressType, MachineFailureReason, MachinePhase, NodeReference,
    ObjectReference,
};
