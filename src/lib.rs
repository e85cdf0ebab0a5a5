//! Foundry - CRD-driven Kubernetes operator for machine lifecycle management
//!
//! Foundry drives `Machine` resources through a bootstrap → provisioning →
//! running lifecycle. A Machine does not provision anything by itself: it
//! delegates to a bootstrap provider and an infrastructure provider, each
//! represented by an opaque object the Machine only references. Foundry
//! adopts those objects, watches them, and folds their readiness and failure
//! signals back into the Machine's status.
//!
//! # Architecture
//!
//! - A Machine carries two external references: an optional bootstrap config
//!   and a mandatory infrastructure object. Provider controllers own those
//!   objects and populate their status; Foundry only reads, labels, and
//!   patches them.
//! - Every "not ready yet" condition surfaces as a typed retry signal that
//!   the controller turns into a delayed requeue. Reconciliation is
//!   idempotent and re-runs from scratch on every trigger.
//! - The Machine's phase is never set directly; it is derived from the rest
//!   of the status after every pass.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Machine, Cluster)
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`external`] - Generic handling of provider-owned external objects
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod external;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// These constants define the default values used throughout Foundry.
// Centralizing them here ensures consistency across CRD defaults, controller
// configs, and test fixtures.

/// API group for all Foundry resources
pub const API_GROUP: &str = "foundry.dev";

/// Label merged onto adopted external objects, carrying the owning cluster name
pub const CLUSTER_NAME_LABEL: &str = "foundry.dev/cluster-name";

/// Annotation that pauses reconciliation of the annotated object
pub const PAUSED_ANNOTATION: &str = "foundry.dev/paused";

/// Field manager used for server-side apply of CRDs and status patches
pub const FIELD_MANAGER: &str = "foundry-controller";

/// Default wait before re-checking an external object that is missing or not
/// ready yet. Injected into the controller context; override with
/// `--external-ready-wait-secs`.
pub const DEFAULT_EXTERNAL_READY_WAIT_SECS: u64 = 30;
