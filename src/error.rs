//! Error types for the Foundry operator

use std::time::Duration;

use thiserror::Error;

use crate::external::accessor::AccessError;

/// Main error type for Foundry operations
///
/// Two variants are control flow rather than failures: [`Error::RetryAfter`]
/// asks the scheduler to re-run the whole pass after a delay, and
/// [`Error::ExternalNotFound`] is the typed form of "the referenced provider
/// object does not exist (yet)". Both are matched on by kind, never by
/// message content.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Expected, transient condition: re-run the reconciliation pass no
    /// sooner than `after`
    #[error("{message} (retrying in {after:?})")]
    RetryAfter {
        /// Minimum delay before the pass should re-run
        after: Duration,
        /// Diagnostic description of what is being waited on
        message: String,
    },

    /// A referenced external object could not be found
    #[error("could not find {api_version}/{kind} {name:?} in namespace {namespace:?}, retrying in {after:?}")]
    ExternalNotFound {
        /// apiVersion of the missing object
        api_version: String,
        /// Kind of the missing object
        kind: String,
        /// Name of the missing object
        name: String,
        /// Namespace the lookup ran in
        namespace: String,
        /// Minimum delay before the lookup should be retried
        after: Duration,
    },

    /// An external reference carries an apiVersion outside the supported
    /// contract
    #[error("unsupported API contract version: {0}")]
    UnsupportedContract(String),

    /// Validation error: an external object or Machine spec is in a genuinely
    /// invalid state, not a transient race
    #[error("validation error: {0}")]
    Validation(String),

    /// Structural field access on an external object failed
    #[error("field access error: {0}")]
    Field(#[from] AccessError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a retry signal with the given delay and diagnostic message
    pub fn retry_after(after: Duration, message: impl Into<String>) -> Self {
        Self::RetryAfter {
            after,
            message: message.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// The delay this error asks the scheduler to wait before re-running the
    /// pass, if it is a retry-class signal
    ///
    /// Returns `None` for genuine failures, which requeue on the scheduler's
    /// default short interval instead.
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Self::RetryAfter { after, .. } | Self::ExternalNotFound { after, .. } => Some(*after),
            _ => None,
        }
    }

    /// True if this error is the typed not-found condition for an external
    /// reference
    pub fn is_external_not_found(&self) -> bool {
        matches!(self, Self::ExternalNotFound { .. })
    }
}
