//! Watch-fed object caches with event fan-out
//!
//! One cache per supported kind holds the current local copy of every
//! watched object. The cache is written only by the controller's watch
//! tasks; readers get independent snapshots. Every applied change is also
//! fanned out on a broadcast channel so callers can wait for convergence
//! instead of polling the map.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Error;
use crate::object::GenericObject;
use crate::watch::ObjectEvent;
use crate::Result;

/// Capacity of the per-cache event channel; subscribers that lag further
/// than this miss events (the cache itself never does)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Local mirror of the watched objects of one resource kind
pub struct ObjectCache {
    objects: RwLock<HashMap<(String, String), GenericObject>>,
    events: broadcast::Sender<ObjectEvent>,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Store the post-event snapshot and notify subscribers
    pub(crate) fn apply(&self, object: GenericObject) {
        let key = object_key(&object);
        debug!(namespace = %key.0, name = %key.1, "cache apply");
        self.objects
            .write()
            .expect("cache lock poisoned")
            .insert(key, object.clone());
        // no receivers is fine
        let _ = self.events.send(ObjectEvent::Applied(object));
    }

    /// Drop the object and notify subscribers
    pub(crate) fn remove(&self, object: GenericObject) {
        let key = object_key(&object);
        debug!(namespace = %key.0, name = %key.1, "cache remove");
        self.objects
            .write()
            .expect("cache lock poisoned")
            .remove(&key);
        let _ = self.events.send(ObjectEvent::Deleted(object));
    }

    /// Snapshot of one object, if cached
    pub fn get(&self, namespace: &str, name: &str) -> Option<GenericObject> {
        self.objects
            .read()
            .expect("cache lock poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Snapshots of every cached object
    pub fn list(&self) -> Vec<GenericObject> {
        self.objects
            .read()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Subscribe to changes applied to this cache
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectEvent> {
        self.events.subscribe()
    }
}

fn object_key(object: &GenericObject) -> (String, String) {
    (
        object.namespace().unwrap_or_default().to_string(),
        object.name().unwrap_or_default().to_string(),
    )
}

/// Wait until `predicate` matches an event on `receiver`, up to `timeout`.
///
/// Convergence after a scale write is eventual, bounded only by watch
/// latency; this is the subscribe-then-wait pattern callers (and tests)
/// use instead of assuming instantaneous delivery. Lagged subscriptions
/// skip ahead rather than failing.
pub async fn wait_for_event<F>(
    receiver: &mut broadcast::Receiver<ObjectEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Result<ObjectEvent>
where
    F: FnMut(&ObjectEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, receiver.recv())
            .await
            .map_err(|_| {
                Error::Watch(format!("no matching event within {:?}", timeout))
            })?;
        match event {
            Ok(event) if predicate(&event) => return Ok(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "event subscriber lagged, continuing");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(Error::Watch("event channel closed".into()));
            }
        }
    }
}
