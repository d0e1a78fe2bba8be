//! In-memory fake cluster for the integration tests
//!
//! One store plays both external collaborators: the authoritative scale
//! client (with real resource-version conflict semantics) and the watch
//! event source (scale updates emit the events a real watch would deliver).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use k8s_openapi::api::autoscaling::v1::{Scale, ScaleSpec};
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedSender};

use capi_autoscaler::bounds::{
    NODE_GROUP_MAX_SIZE_ANNOTATION, NODE_GROUP_MIN_SIZE_ANNOTATION,
};
use capi_autoscaler::error::Error;
use capi_autoscaler::identity::{
    DiscoveredGroup, DiscoveredResource, DiscoveredVersion, ResourceIdentity,
};
use capi_autoscaler::kinds::{KindRegistry, RegisteredKind};
use capi_autoscaler::object::GenericObject;
use capi_autoscaler::scale::{desired_replicas, ScaleClient};
use capi_autoscaler::watch::{EventSource, EventStream, ObjectEvent};
use capi_autoscaler::Result;

type Key = (String, String, String);

struct Entry {
    object: GenericObject,
    version: u64,
}

/// Fake cluster: object store + scale subresource + watch fan-out
pub struct FakeCluster {
    state: Mutex<HashMap<Key, Entry>>,
    senders: Mutex<HashMap<String, Vec<UnboundedSender<Result<ObjectEvent>>>>>,
    registry: KindRegistry,
    stale_get: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HashMap::new()),
            senders: Mutex::new(HashMap::new()),
            registry: KindRegistry::default(),
            stale_get: AtomicBool::new(false),
        })
    }

    fn key(object: &GenericObject) -> Key {
        (
            object.kind().expect("fixture declares kind").to_string(),
            object.namespace().expect("fixture has namespace").to_string(),
            object.name().expect("fixture has name").to_string(),
        )
    }

    fn replica_path(&self, kind: &str) -> Vec<&str> {
        self.registry
            .get(kind)
            .expect("kind registered")
            .replica_path()
    }

    fn emit(&self, event: ObjectEvent) {
        let kind = event
            .object()
            .kind()
            .expect("fixture declares kind")
            .to_string();
        let senders = self.senders.lock().unwrap();
        for tx in senders.get(&kind).into_iter().flatten() {
            let _ = tx.send(Ok(event.clone()));
        }
    }

    /// Put an object into the store without notifying watchers (the
    /// initial list delivers it once a watch opens)
    pub fn seed(&self, mut object: GenericObject) {
        let key = Self::key(&object);
        object.metadata.resource_version = Some("1".to_string());
        self.state.lock().unwrap().insert(
            key,
            Entry { object, version: 1 },
        );
    }

    /// Serve a stale resource version on the next scale get, simulating a
    /// reader that lost a race with another writer
    pub fn serve_stale_get_once(&self) {
        self.stale_get.store(true, Ordering::SeqCst);
    }

    /// The current authoritative copy of an object
    pub fn authoritative(&self, kind: &str, namespace: &str, name: &str) -> GenericObject {
        self.state
            .lock()
            .unwrap()
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .map(|entry| entry.object.clone())
            .expect("object exists in fake cluster")
    }

    /// Mutate the store the way another actor would: bump the version,
    /// rewrite the replica count, and notify watchers
    pub fn external_scale(&self, kind: &str, namespace: &str, name: &str, replicas: i64) {
        let path = self.replica_path(kind);
        let updated = {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .get_mut(&(kind.to_string(), namespace.to_string(), name.to_string()))
                .expect("object exists in fake cluster");
            entry.version += 1;
            let mut object = entry
                .object
                .with_replicas(&path, replicas)
                .expect("replica path is writable");
            object.metadata.resource_version = Some(entry.version.to_string());
            entry.object = object.clone();
            object
        };
        self.emit(ObjectEvent::Applied(updated));
    }

    /// Delete an object and notify watchers
    pub fn delete(&self, kind: &str, namespace: &str, name: &str) {
        let removed = self
            .state
            .lock()
            .unwrap()
            .remove(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .expect("object exists in fake cluster");
        self.emit(ObjectEvent::Deleted(removed.object));
    }
}

#[async_trait]
impl ScaleClient for FakeCluster {
    async fn get_scale(
        &self,
        _identity: &ResourceIdentity,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Scale> {
        let path = self.replica_path(kind);
        let state = self.state.lock().unwrap();
        let entry = state
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .ok_or_else(|| Error::not_found(kind, namespace, name, "scale subresource get"))?;

        let mut version = entry.version;
        if self.stale_get.swap(false, Ordering::SeqCst) {
            version -= 1;
        }

        let replicas = entry
            .object
            .nested_i64(&path)?
            .unwrap_or(0);

        Ok(Scale {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            spec: Some(ScaleSpec {
                replicas: Some(replicas as i32),
            }),
            status: None,
        })
    }

    async fn update_scale(
        &self,
        _identity: &ResourceIdentity,
        kind: &str,
        namespace: &str,
        name: &str,
        scale: &Scale,
    ) -> Result<Scale> {
        let path = self.replica_path(kind);
        let updated = {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .get_mut(&(kind.to_string(), namespace.to_string(), name.to_string()))
                .ok_or_else(|| {
                    Error::not_found(kind, namespace, name, "scale subresource update")
                })?;

            let carried = scale.metadata.resource_version.as_deref().unwrap_or("");
            if carried != entry.version.to_string() {
                return Err(Error::conflict(
                    kind,
                    namespace,
                    name,
                    format!(
                        "resource version {} does not match {}",
                        carried, entry.version
                    ),
                ));
            }

            entry.version += 1;
            let mut object = entry
                .object
                .with_replicas(&path, i64::from(desired_replicas(scale)))
                .expect("replica path is writable");
            object.metadata.resource_version = Some(entry.version.to_string());
            entry.object = object.clone();
            object
        };

        let new_version = updated.resource_version().map(String::from);
        self.emit(ObjectEvent::Applied(updated));

        let mut result = scale.clone();
        result.metadata.resource_version = new_version;
        Ok(result)
    }
}

#[async_trait]
impl EventSource for FakeCluster {
    async fn events(&self, entry: &RegisteredKind, _namespace: Option<&str>) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap()
            .entry(entry.kind.clone())
            .or_default()
            .push(tx);

        // initial list, the way a real watch starts
        let initial: Vec<Result<ObjectEvent>> = self
            .state
            .lock()
            .unwrap()
            .iter()
            .filter(|((kind, _, _), _)| *kind == entry.kind)
            .map(|(_, e)| Ok(ObjectEvent::Applied(e.object.clone())))
            .collect();

        let live = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(stream::iter(initial).chain(live).boxed())
    }
}

/// Discovery listing the two default Cluster API kinds
pub fn capi_discovery() -> Vec<DiscoveredGroup> {
    vec![DiscoveredGroup {
        group: "cluster.x-k8s.io".into(),
        versions: vec![DiscoveredVersion {
            version: "v1beta1".into(),
            resources: vec![
                DiscoveredResource {
                    kind: "MachineSet".into(),
                    plural: "machinesets".into(),
                },
                DiscoveredResource {
                    kind: "MachineDeployment".into(),
                    plural: "machinedeployments".into(),
                },
            ],
        }],
    }]
}

/// A node-group fixture of the given kind in namespace "default"
pub fn node_group_object(
    kind: &str,
    name: &str,
    replicas: i64,
    bounds: Option<(&str, &str)>,
) -> GenericObject {
    let mut annotations = serde_json::Map::new();
    if let Some((min, max)) = bounds {
        annotations.insert(NODE_GROUP_MIN_SIZE_ANNOTATION.into(), json!(min));
        annotations.insert(NODE_GROUP_MAX_SIZE_ANNOTATION.into(), json!(max));
    }

    serde_json::from_value(json!({
        "apiVersion": "cluster.x-k8s.io/v1beta1",
        "kind": kind,
        "metadata": {
            "name": name,
            "namespace": "default",
            "annotations": annotations,
        },
        "spec": { "replicas": replicas },
        "status": { "replicas": replicas },
    }))
    .expect("valid fixture json")
}
