//! The uniform node-group wrapper
//!
//! [`ScalableResource`] binds one object snapshot to the controller that
//! produced it and presents the operations the autoscaling loop consumes:
//! replica read, replica write, and declared size bounds. The two supported
//! replica semantics differ slightly in how much the snapshot can be
//! trusted, but callers see a single contract.
//!
//! Replica reads reflect exactly the snapshot the wrapper was built from;
//! they never re-fetch. A write goes through the authoritative scale
//! subresource and returns without waiting for the watch to deliver the
//! change; callers re-wrap from a fresh cache read to observe convergence.

use std::sync::OnceLock;

use tracing::info;

use crate::bounds::ScalingBounds;
use crate::controller::Controller;
use crate::error::Error;
use crate::identity::ResourceIdentity;
use crate::kinds::{RegisteredKind, ReplicaSemantics};
use crate::object::GenericObject;
use crate::scale::desired_replicas;
use crate::Result;

/// One node group: a wrapped object snapshot plus the controller it came
/// from.
///
/// Ephemeral and cheap to construct; not cached. The borrow of the
/// controller keeps every wrapper inside the controller's lifetime.
pub struct ScalableResource<'a> {
    controller: &'a Controller,
    object: GenericObject,
    entry: RegisteredKind,
    bounds: ScalingBounds,
    namespace: String,
    name: String,
    api_version: String,
    identity: OnceLock<ResourceIdentity>,
}

impl std::fmt::Debug for ScalableResource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalableResource")
            .field("entry", &self.entry)
            .field("bounds", &self.bounds)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("api_version", &self.api_version)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<'a> ScalableResource<'a> {
    /// Wrap `object`, validating it is a supported, well-formed kind.
    ///
    /// Malformed bounds annotations fail here, at construction, rather
    /// than surfacing later as a bad scaling decision.
    pub(crate) fn new(controller: &'a Controller, object: &GenericObject) -> Result<Self> {
        let name = object.name().unwrap_or("<unnamed>");

        let kind = object
            .kind()
            .ok_or_else(|| Error::field_missing("<unknown>", name, "kind"))?;
        let entry = controller.registry().get(kind).ok_or_else(|| {
            Error::validation(format!("unsupported kind {:?} for node group {}", kind, name))
        })?;

        let api_version = object
            .api_version()
            .ok_or_else(|| Error::field_missing(kind, name, "apiVersion"))?
            .to_string();
        let name = object
            .name()
            .ok_or_else(|| Error::field_missing(kind, "<unnamed>", "metadata.name"))?
            .to_string();
        let namespace = object
            .namespace()
            .ok_or_else(|| Error::field_missing(kind, &name, "metadata.namespace"))?
            .to_string();

        let bounds = ScalingBounds::from_annotations(object)?;

        Ok(Self {
            controller,
            object: object.clone(),
            entry: entry.clone(),
            bounds,
            namespace,
            name,
            api_version,
            identity: OnceLock::new(),
        })
    }

    /// Resource kind
    pub fn kind(&self) -> &str {
        &self.entry.kind
    }

    /// Resource namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node-group identifier: "namespace/name"
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Declared floor, or 0 when none is declared
    pub fn min_size(&self) -> i32 {
        self.bounds.min_size()
    }

    /// Declared ceiling, or [`crate::bounds::UNBOUNDED_MAX_SIZE`] when none
    /// is declared
    pub fn max_size(&self) -> i32 {
        self.bounds.max_size()
    }

    /// Whether the resource opted into autoscaling by declaring any bound
    pub fn autoscaling_enabled(&self) -> bool {
        self.bounds.declared()
    }

    /// Group-version-resource identity for addressing the scale
    /// subresource; resolved once and memoized per wrapper.
    pub async fn group_version_resource(&self) -> Result<ResourceIdentity> {
        if let Some(identity) = self.identity.get() {
            return Ok(identity.clone());
        }
        let identity = self
            .controller
            .resolver()
            .resolve(&self.entry.kind, &self.api_version)
            .await?;
        // a concurrent resolve of the same wrapper returns the same value
        let _ = self.identity.set(identity.clone());
        Ok(identity)
    }

    /// Desired replica count, read from the wrapped snapshot.
    ///
    /// No network call; the value is whatever the cache held when the
    /// wrapper was constructed. A missing replica field reads as 0 (a
    /// freshly-created resource the defaulting webhook has not touched
    /// yet). Deployment-style resources that are being deleted fail
    /// instead of reporting a stale count.
    pub fn replicas(&self) -> Result<i32> {
        if self.entry.semantics == ReplicaSemantics::Templated && self.object.is_deleting() {
            return Err(Error::deleting(
                &self.entry.kind,
                &self.namespace,
                &self.name,
            ));
        }

        let path = self.entry.replica_path();
        let value = self.object.nested_i64(&path)?.unwrap_or(0);
        i32::try_from(value).map_err(|_| Error::type_mismatch(&path, "i32"))
    }

    /// Observed replica count from `status.replicas` (for deployment-style
    /// resources, the rolled-up status of the child replica set); 0 when
    /// not yet reported.
    pub fn status_replicas(&self) -> Result<i32> {
        let path = ["status", "replicas"];
        let value = self.object.nested_i64(&path)?.unwrap_or(0);
        i32::try_from(value).map_err(|_| Error::type_mismatch(&path, "i32"))
    }

    /// Set the desired replica count through the scale subresource.
    ///
    /// Read-modify-write with optimistic concurrency: the update carries
    /// the resource version from the authoritative read, so a concurrent
    /// external mutation fails with [`Error::Conflict`] instead of being
    /// clobbered. No internal retry; see [`crate::retry`] for the caller
    /// side.
    ///
    /// Returns as soon as the write is accepted. The wrapped snapshot is
    /// left untouched; the watch delivers the new state to the caches
    /// asynchronously.
    pub async fn set_size(&self, replicas: i32) -> Result<()> {
        if replicas < 0 {
            return Err(Error::validation(format!(
                "replica count for {} must be >= 0, got {}",
                self.id(),
                replicas
            )));
        }

        let identity = self.group_version_resource().await?;
        let mut scale = self
            .controller
            .scale_client()
            .get_scale(&identity, &self.entry.kind, &self.namespace, &self.name)
            .await?;

        info!(
            kind = %self.entry.kind,
            namespace = %self.namespace,
            name = %self.name,
            from = desired_replicas(&scale),
            to = replicas,
            "scaling node group"
        );

        scale.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        self.controller
            .scale_client()
            .update_scale(&identity, &self.entry.kind, &self.namespace, &self.name, &scale)
            .await?;
        Ok(())
    }
}
