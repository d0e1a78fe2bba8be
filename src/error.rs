//! Error types for the node-group provider core
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the resource context (kind, namespace, name) where it
//! exists, so the autoscaling loop can decide how to react without parsing
//! message strings: a missing node group is dropped from consideration, a
//! write conflict is retried with a fresh read, and schema violations are
//! surfaced immediately.

use thiserror::Error;

/// Main error type for node-group operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// No discovery match, no cache entry, or the resource is gone
    #[error("{kind} {at} not found: {message}")]
    NotFound {
        /// Resource kind (e.g. "MachineSet")
        kind: String,
        /// Where the lookup happened: "namespace/name" for cache lookups,
        /// "group/version" for discovery lookups
        at: String,
        /// What was being looked up when the resource was missing
        message: String,
    },

    /// A field exists but has an unexpected underlying type
    #[error("type mismatch at {path}: expected {expected}")]
    TypeMismatch {
        /// Dotted path to the offending field
        path: String,
        /// The type the caller asked for
        expected: &'static str,
    },

    /// An expected field is absent and no default applies
    #[error("{kind} {name}: missing required field {path}")]
    FieldMissing {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Dotted path to the absent field
        path: String,
    },

    /// Optimistic-concurrency failure on a scale update
    ///
    /// The resource changed between the authoritative read and the write.
    /// Retriable by the caller with a fresh read; see [`crate::retry`].
    #[error("conflict updating scale of {kind} {namespace}/{name}: {message}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Resource namespace
        namespace: String,
        /// Resource name
        name: String,
        /// Server-reported conflict detail
        message: String,
    },

    /// The resource was observed in a terminal/deleting condition
    ///
    /// Callers should treat the node group as having zero capacity rather
    /// than acting on its stale last-known replica count.
    #[error("{kind} {namespace}/{name} is being deleted")]
    Deleting {
        /// Resource kind
        kind: String,
        /// Resource namespace
        namespace: String,
        /// Resource name
        name: String,
    },

    /// Invalid caller input or malformed resource metadata
    #[error("validation error: {0}")]
    Validation(String),

    /// Watch stream failure from the underlying client
    ///
    /// Usually transient; the watcher re-lists and resumes on its own.
    #[error("watch error: {0}")]
    Watch(String),
}

impl Error {
    /// Create a not-found error for a cache or live lookup
    pub fn not_found(
        kind: impl Into<String>,
        namespace: &str,
        name: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            at: format!("{}/{}", namespace, name),
            message: message.into(),
        }
    }

    /// Create a not-found error for a discovery lookup
    pub fn not_served(kind: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            at: api_version.into(),
            message: "no served API resource matches".into(),
        }
    }

    /// Create a type-mismatch error for a dotted field path
    pub fn type_mismatch(path: &[&str], expected: &'static str) -> Self {
        Self::TypeMismatch {
            path: path.join("."),
            expected,
        }
    }

    /// Create a missing-field error with resource context
    pub fn field_missing(
        kind: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::FieldMissing {
            kind: kind.into(),
            name: name.into(),
            path: path.into(),
        }
    }

    /// Create a conflict error with resource context
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a deleting-state error with resource context
    pub fn deleting(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Deleting {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error is an optimistic-concurrency conflict
    ///
    /// True for [`Error::Conflict`] and for raw Kubernetes 409 responses
    /// that were not mapped at the scale-client layer.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    /// Whether this error means the resource no longer exists
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}
