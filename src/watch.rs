//! Watch event subscription seam
//!
//! The controller keeps its caches fresh by subscribing to per-kind event
//! streams. The production source runs a kube-rs watcher over the dynamic
//! API; tests substitute channel-fed streams. Either way the contract is the
//! same: the initial list arrives as `Applied` events, followed by every
//! subsequent change in per-object order.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::watcher;
use kube::runtime::watcher::Event;
use kube::Client;
use std::sync::Arc;

use crate::error::Error;
use crate::identity::IdentityResolver;
use crate::kinds::RegisteredKind;
use crate::object::GenericObject;
use crate::Result;

/// A single change observed on a watched resource kind
#[derive(Clone, Debug)]
pub enum ObjectEvent {
    /// The object was added or updated; carries the post-event snapshot
    Applied(GenericObject),
    /// The object was deleted; carries the last-known snapshot
    Deleted(GenericObject),
}

impl ObjectEvent {
    /// The snapshot carried by the event
    pub fn object(&self) -> &GenericObject {
        match self {
            Self::Applied(obj) | Self::Deleted(obj) => obj,
        }
    }
}

/// Stream of changes for one watched kind
pub type EventStream = BoxStream<'static, Result<ObjectEvent>>;

/// Source of per-kind watch event streams
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open an event stream for one registered kind.
    ///
    /// `namespace` limits the watch scope; `None` watches all namespaces.
    async fn events(&self, entry: &RegisteredKind, namespace: Option<&str>) -> Result<EventStream>;
}

/// Event source backed by the API server via kube-rs watchers.
///
/// The underlying watcher re-lists and resumes on desync; transient
/// failures surface as error items on the stream and do not end it.
pub struct KubeEventSource {
    client: Client,
    resolver: Arc<IdentityResolver>,
}

impl KubeEventSource {
    /// Create an event source for the given client and resolver
    pub fn new(client: Client, resolver: Arc<IdentityResolver>) -> Self {
        Self { client, resolver }
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn events(&self, entry: &RegisteredKind, namespace: Option<&str>) -> Result<EventStream> {
        let identity = self
            .resolver
            .resolve(&entry.kind, &entry.api_version)
            .await?;
        let ar = identity.api_resource(&entry.kind);

        let api: Api<GenericObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let stream = watcher::watcher(api, watcher::Config::default())
            .filter_map(|event| async move {
                match event {
                    Ok(Event::Apply(obj)) | Ok(Event::InitApply(obj)) => {
                        Some(Ok(ObjectEvent::Applied(obj)))
                    }
                    Ok(Event::Delete(obj)) => Some(Ok(ObjectEvent::Deleted(obj))),
                    // page markers around the initial list
                    Ok(Event::Init) | Ok(Event::InitDone) => None,
                    Err(e) => Some(Err(Error::Watch(e.to_string()))),
                }
            })
            .boxed();

        Ok(stream)
    }
}
