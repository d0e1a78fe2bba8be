//! Registry of supported kinds and their replica semantics
//!
//! The set of resource kinds treated as node groups is a fixed registry
//! keyed by Kind name. Supporting a new kind means adding one entry, plus a
//! replica path when the kind keeps its desired count somewhere other than
//! `spec.replicas`.

use std::collections::HashMap;

use crate::CAPI_API_VERSION;

/// Where a kind keeps its desired replica count and how indirect its
/// scaling is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicaSemantics {
    /// Replica count lives directly on the resource, which owns its
    /// machines (MachineSet-like)
    Direct,
    /// Deployment-style resource that scales through a templated child
    /// replica set; its state must be checked before trusting the count
    Templated,
}

/// One supported resource kind
#[derive(Clone, Debug)]
pub struct RegisteredKind {
    /// Kind name (e.g. "MachineSet"); the registry key
    pub kind: String,
    /// apiVersion the kind is watched at (e.g. "cluster.x-k8s.io/v1beta1")
    pub api_version: String,
    /// Replica semantics for this kind
    pub semantics: ReplicaSemantics,
    /// Path to the desired replica count within the attribute tree
    replica_path: Vec<String>,
}

impl RegisteredKind {
    /// Register a kind with the default `spec.replicas` path
    pub fn new(
        kind: impl Into<String>,
        api_version: impl Into<String>,
        semantics: ReplicaSemantics,
    ) -> Self {
        Self {
            kind: kind.into(),
            api_version: api_version.into(),
            semantics,
            replica_path: vec!["spec".to_string(), "replicas".to_string()],
        }
    }

    /// Override the replica path for kinds that keep the count elsewhere
    pub fn with_replica_path(mut self, path: &[&str]) -> Self {
        self.replica_path = path.iter().map(|s| s.to_string()).collect();
        self
    }

    /// The replica path as borrowed segments, for the object accessors
    pub fn replica_path(&self) -> Vec<&str> {
        self.replica_path.iter().map(String::as_str).collect()
    }

    /// The Cluster API MachineSet kind
    pub fn machine_set() -> Self {
        Self::new("MachineSet", CAPI_API_VERSION, ReplicaSemantics::Direct)
    }

    /// The Cluster API MachineDeployment kind
    pub fn machine_deployment() -> Self {
        Self::new(
            "MachineDeployment",
            CAPI_API_VERSION,
            ReplicaSemantics::Templated,
        )
    }
}

/// Registry keyed by Kind name.
///
/// The default registry holds the two Cluster API kinds in
/// [`crate::CAPI_GROUP`].
#[derive(Clone, Debug)]
pub struct KindRegistry {
    entries: HashMap<String, RegisteredKind>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.register(RegisteredKind::machine_set());
        registry.register(RegisteredKind::machine_deployment());
        registry
    }
}

impl KindRegistry {
    /// An empty registry, for embedders that support a disjoint kind set
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace a kind entry
    pub fn register(&mut self, entry: RegisteredKind) {
        self.entries.insert(entry.kind.clone(), entry);
    }

    /// Look up a kind by name
    pub fn get(&self, kind: &str) -> Option<&RegisteredKind> {
        self.entries.get(kind)
    }

    /// Whether the kind is supported
    pub fn is_supported(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Iterate over the registered kinds
    pub fn kinds(&self) -> impl Iterator<Item = &RegisteredKind> {
        self.entries.values()
    }
}
