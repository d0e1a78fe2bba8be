//! Kind/apiVersion to group-version-resource resolution
//!
//! The scale subresource is addressed by the plural resource name, which
//! nothing on a watched object carries. This module resolves an object's
//! declared (Kind, apiVersion) against the API groups served by the cluster
//! and caches the result: identity is stable for the process lifetime, so
//! discovery runs at most once per (apiVersion, Kind) pair.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use kube::discovery::{ApiResource, Discovery};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::error::Error;
use crate::Result;

/// The coordinates required to address a resource kind's subresources.
///
/// The (group, resource) pair is the logical identity; the version is
/// carried because the request path needs it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    /// API group (empty for the core group)
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Plural resource name (e.g. "machinesets")
    pub resource: String,
}

impl ResourceIdentity {
    /// apiVersion string form: "group/version", or bare "version" for core
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Build the `ApiResource` needed to construct a dynamic API for `kind`
    pub fn api_resource(&self, kind: &str) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: kind.to_string(),
            plural: self.resource.clone(),
        }
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// One resource entry in a served API group version
#[derive(Clone, Debug)]
pub struct DiscoveredResource {
    /// Resource Kind (e.g. "MachineSet")
    pub kind: String,
    /// Plural resource name (e.g. "machinesets")
    pub plural: String,
}

/// One version of a served API group
#[derive(Clone, Debug)]
pub struct DiscoveredVersion {
    /// Version string (e.g. "v1beta1")
    pub version: String,
    /// Resources served at this group/version
    pub resources: Vec<DiscoveredResource>,
}

/// One API group known to the cluster
#[derive(Clone, Debug)]
pub struct DiscoveredGroup {
    /// Group name (empty for the core group)
    pub group: String,
    /// Served versions
    pub versions: Vec<DiscoveredVersion>,
}

/// Source of the API groups served by the cluster.
///
/// Abstracts the discovery endpoint so the resolver can run against a live
/// API server or a fixed list.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// List the API groups currently served
    async fn api_groups(&self) -> Result<Vec<DiscoveredGroup>>;
}

/// Discovery backed by the API server via kube-rs discovery
pub struct ApiServerDiscovery {
    client: Client,
}

impl ApiServerDiscovery {
    /// Create a discovery source for the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoverySource for ApiServerDiscovery {
    async fn api_groups(&self) -> Result<Vec<DiscoveredGroup>> {
        let discovery = Discovery::new(self.client.clone()).run().await?;

        let mut groups = Vec::new();
        for api_group in discovery.groups() {
            let mut versions = Vec::new();
            for version in api_group.versions() {
                let version = version.to_string();
                let resources = api_group
                    .versioned_resources(&version)
                    .into_iter()
                    .map(|(ar, _caps)| DiscoveredResource {
                        kind: ar.kind,
                        plural: ar.plural,
                    })
                    .collect();
                versions.push(DiscoveredVersion {
                    version: version.to_string(),
                    resources,
                });
            }
            groups.push(DiscoveredGroup {
                group: api_group.name().to_string(),
                versions,
            });
        }
        Ok(groups)
    }
}

/// A fixed list of API groups, for tests and air-gapped tooling
pub struct StaticDiscovery {
    groups: Vec<DiscoveredGroup>,
}

impl StaticDiscovery {
    /// Create a static source serving exactly `groups`
    pub fn new(groups: Vec<DiscoveredGroup>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl DiscoverySource for StaticDiscovery {
    async fn api_groups(&self) -> Result<Vec<DiscoveredGroup>> {
        Ok(self.groups.clone())
    }
}

/// Split an apiVersion string into (group, version).
///
/// "cluster.x-k8s.io/v1beta1" -> ("cluster.x-k8s.io", "v1beta1");
/// bare "v1" is the core group.
pub fn parse_api_version(api_version: &str) -> Result<(&str, &str)> {
    if api_version.is_empty() {
        return Err(Error::validation("apiVersion must not be empty"));
    }
    match api_version.split_once('/') {
        Some((group, version)) => {
            if group.is_empty() || version.is_empty() || version.contains('/') {
                Err(Error::validation(format!(
                    "malformed apiVersion {:?}: expected \"group/version\" or \"version\"",
                    api_version
                )))
            } else {
                Ok((group, version))
            }
        }
        None => Ok(("", api_version)),
    }
}

/// Resolves (Kind, apiVersion) pairs to [`ResourceIdentity`] and caches the
/// answers for the lifetime of the resolver.
///
/// Concurrent resolutions of the same key may both run discovery; the cache
/// is last-writer-wins, which is safe because results are idempotent per key.
pub struct IdentityResolver {
    source: Arc<dyn DiscoverySource>,
    cache: DashMap<(String, String), ResourceIdentity>,
}

impl IdentityResolver {
    /// Create a resolver over the given discovery source
    pub fn new(source: Arc<dyn DiscoverySource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    /// Resolve the group-version-resource identity for a (Kind, apiVersion).
    ///
    /// Fails with a not-found error when no served API group matches, which
    /// signals a configuration problem: the object's declared apiVersion
    /// does not correspond to any API the cluster serves.
    pub async fn resolve(&self, kind: &str, api_version: &str) -> Result<ResourceIdentity> {
        let key = (api_version.to_string(), kind.to_string());
        if let Some(identity) = self.cache.get(&key) {
            return Ok(identity.clone());
        }

        let (group, version) = parse_api_version(api_version)?;

        let groups = self.source.api_groups().await?;
        for discovered in &groups {
            if discovered.group != group {
                continue;
            }
            for ver in &discovered.versions {
                if ver.version != version {
                    continue;
                }
                if let Some(resource) = ver.resources.iter().find(|r| r.kind == kind) {
                    let identity = ResourceIdentity {
                        group: group.to_string(),
                        version: version.to_string(),
                        resource: resource.plural.clone(),
                    };
                    debug!(
                        kind = %kind,
                        api_version = %api_version,
                        identity = %identity,
                        "Resolved resource identity"
                    );
                    self.cache.insert(key, identity.clone());
                    return Ok(identity);
                }
            }
        }

        Err(Error::not_served(kind, api_version))
    }
}
