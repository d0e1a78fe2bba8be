//! Cache ownership, watch lifecycle, and the wrapper factory
//!
//! The controller owns one watch-fed cache per supported resource kind, the
//! authoritative scale client, and the identity resolver. Queries are served
//! from the caches without touching the network; writes go out-of-band
//! through the scale client and come back around via the watch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use kube::Client;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{wait_for_event, ObjectCache};
use crate::error::Error;
use crate::identity::{ApiServerDiscovery, IdentityResolver};
use crate::kinds::KindRegistry;
use crate::object::GenericObject;
use crate::scalable::ScalableResource;
use crate::scale::{KubeScaleClient, ScaleClient};
use crate::watch::{EventSource, KubeEventSource, ObjectEvent};
use crate::Result;

/// Controller configuration
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// The kinds to watch and serve as node groups
    pub registry: KindRegistry,
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            registry: KindRegistry::default(),
            namespace: None,
        }
    }
}

/// Owns the per-kind caches, the scale client, and the watch tasks.
///
/// [`ScalableResource`] wrappers borrow the controller, so the controller
/// must outlive every wrapper it hands out; the borrow checker enforces
/// this.
pub struct Controller {
    registry: KindRegistry,
    namespace: Option<String>,
    caches: HashMap<String, Arc<ObjectCache>>,
    scale_client: Arc<dyn ScaleClient>,
    resolver: Arc<IdentityResolver>,
    source: Arc<dyn EventSource>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Controller {
    /// Production wiring: API-server discovery, kube scale client, kube
    /// watchers, all sharing `client`.
    ///
    /// Rate limiting for the authoritative write path is configured on
    /// `client` itself.
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let resolver = Arc::new(IdentityResolver::new(Arc::new(ApiServerDiscovery::new(
            client.clone(),
        ))));
        let scale_client = Arc::new(KubeScaleClient::new(client.clone()));
        let source = Arc::new(KubeEventSource::new(client, resolver.clone()));
        Self::with_components(scale_client, resolver, source, config)
    }

    /// Assemble a controller from explicit collaborators.
    ///
    /// This is the seam tests and alternative transports use.
    pub fn with_components(
        scale_client: Arc<dyn ScaleClient>,
        resolver: Arc<IdentityResolver>,
        source: Arc<dyn EventSource>,
        config: ControllerConfig,
    ) -> Self {
        let caches = config
            .registry
            .kinds()
            .map(|entry| (entry.kind.clone(), Arc::new(ObjectCache::new())))
            .collect();
        let (shutdown, _) = watch::channel(false);

        Self {
            registry: config.registry,
            namespace: config.namespace,
            caches,
            scale_client,
            resolver,
            source,
            tasks: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// Start one watch task per registered kind.
    ///
    /// Idempotency is not provided: a second start on a running controller
    /// is a caller error.
    pub async fn start(&self) -> Result<()> {
        {
            let tasks = self.tasks.lock().expect("task list lock poisoned");
            if !tasks.is_empty() {
                return Err(Error::validation("controller is already started"));
            }
        }

        let mut handles = Vec::new();
        for entry in self.registry.kinds() {
            let stream = self
                .source
                .events(entry, self.namespace.as_deref())
                .await?;
            let cache = self
                .caches
                .get(&entry.kind)
                .expect("cache exists for every registered kind")
                .clone();
            let kind = entry.kind.clone();
            let mut shutdown = self.shutdown.subscribe();

            info!(kind = %kind, "starting watch task");
            handles.push(tokio::spawn(async move {
                let mut stream = stream;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            debug!(kind = %kind, "watch task shutting down");
                            break;
                        }
                        event = stream.next() => match event {
                            Some(Ok(ObjectEvent::Applied(obj))) => cache.apply(obj),
                            Some(Ok(ObjectEvent::Deleted(obj))) => cache.remove(obj),
                            Some(Err(e)) => {
                                // transient; the watcher re-lists on its own
                                warn!(kind = %kind, error = %e, "watch stream error");
                            }
                            None => {
                                debug!(kind = %kind, "watch stream ended");
                                break;
                            }
                        }
                    }
                }
            }));
        }

        *self.tasks.lock().expect("task list lock poisoned") = handles;
        Ok(())
    }

    /// Signal the watch tasks to stop and wait for them to exit
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handles = std::mem::take(&mut *self.tasks.lock().expect("task list lock poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
        info!("controller stopped");
    }

    /// Cache-only lookup of one watched object.
    ///
    /// Never falls back to a live read: an object the watch has not yet
    /// delivered (or has deleted) is not found.
    pub fn get_resource(&self, kind: &str, namespace: &str, name: &str) -> Result<GenericObject> {
        let cache = self
            .caches
            .get(kind)
            .ok_or_else(|| Error::validation(format!("unsupported kind {:?}", kind)))?;
        cache
            .get(namespace, name)
            .ok_or_else(|| Error::not_found(kind, namespace, name, "not in cache"))
    }

    /// Wrap one object snapshot as a scalable node group.
    ///
    /// The wrapper is cheap and ephemeral; construct a fresh one per query
    /// so reads reflect the cache state at call time.
    pub fn scalable_resource<'a>(
        &'a self,
        object: &GenericObject,
    ) -> Result<ScalableResource<'a>> {
        ScalableResource::new(self, object)
    }

    /// Discovery sweep: wrap every cached object that opted into
    /// autoscaling by declaring a size bound.
    ///
    /// A malformed bound annotation on any candidate fails the sweep; a
    /// half-discovered node-group set is worse than a loud error.
    pub fn scalable_resources(&self) -> Result<Vec<ScalableResource<'_>>> {
        let mut groups = Vec::new();
        for cache in self.caches.values() {
            for object in cache.list() {
                let wrapper = ScalableResource::new(self, &object)?;
                if wrapper.autoscaling_enabled() {
                    groups.push(wrapper);
                }
            }
        }
        Ok(groups)
    }

    /// Subscribe to cache changes for one kind
    pub fn subscribe(&self, kind: &str) -> Result<broadcast::Receiver<ObjectEvent>> {
        self.caches
            .get(kind)
            .map(|cache| cache.subscribe())
            .ok_or_else(|| Error::validation(format!("unsupported kind {:?}", kind)))
    }

    /// Wait until `predicate` matches a cache event for `kind`, up to
    /// `timeout`.
    ///
    /// Subscribe-then-wait over the event channel; events applied before
    /// the call are not replayed.
    pub async fn wait_for<F>(
        &self,
        kind: &str,
        timeout: Duration,
        predicate: F,
    ) -> Result<ObjectEvent>
    where
        F: FnMut(&ObjectEvent) -> bool,
    {
        let mut receiver = self.subscribe(kind)?;
        wait_for_event(&mut receiver, timeout, predicate).await
    }

    pub(crate) fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub(crate) fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub(crate) fn scale_client(&self) -> &dyn ScaleClient {
        self.scale_client.as_ref()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // stop() is the graceful path; this is the backstop
        if let Ok(tasks) = self.tasks.lock() {
            for handle in tasks.iter() {
                handle.abort();
            }
        }
    }
}
