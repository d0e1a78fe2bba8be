//! capi-autoscaler - Cluster API node-group provider core for cluster autoscaling
//!
//! This crate presents replica-set-like Cluster API resources (MachineSet,
//! MachineDeployment) to a generic autoscaling loop as uniform, resizable
//! node groups. Replica reads are served from a watch-fed local cache and
//! never touch the network; replica writes go through the authoritative
//! scale subresource with optimistic concurrency.
//!
//! # Architecture
//!
//! - A [`controller::Controller`] owns one watch-fed cache per supported
//!   resource kind, the scale client, and the identity resolver
//! - Callers ask the controller for a [`scalable::ScalableResource`] wrapping
//!   the current cached copy of one resource
//! - Reads ([`scalable::ScalableResource::replicas`], bounds) come from the
//!   wrapped snapshot; [`scalable::ScalableResource::set_size`] performs an
//!   authoritative read-modify-write and returns without waiting for the
//!   watch to catch up
//!
//! # Modules
//!
//! - [`object`] - Schema-less object view with typed path access
//! - [`identity`] - Kind/apiVersion to group-version-resource resolution
//! - [`kinds`] - Registry of supported kinds and their replica semantics
//! - [`bounds`] - Min/max node-group size annotations
//! - [`scalable`] - The uniform node-group wrapper
//! - [`controller`] - Cache ownership, watch lifecycle, wrapper factory
//! - [`scale`] - Scale subresource client
//! - [`watch`] - Watch event subscription seam
//! - [`cache`] - Watch-fed object caches with event fan-out
//! - [`retry`] - Caller-side conflict retry helper
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod bounds;
pub mod cache;
pub mod controller;
pub mod error;
pub mod identity;
pub mod kinds;
pub mod object;
pub mod retry;
pub mod scalable;
pub mod scale;
pub mod watch;

#[cfg(test)]
pub(crate) mod testfix;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the Cluster API resources supported by default
pub const CAPI_GROUP: &str = "cluster.x-k8s.io";

/// API version (group/version) of the Cluster API resources supported by default
pub const CAPI_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
