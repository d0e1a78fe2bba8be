//! Shared fixtures for the unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use k8s_openapi::api::autoscaling::v1::Scale;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::bounds::{NODE_GROUP_MAX_SIZE_ANNOTATION, NODE_GROUP_MIN_SIZE_ANNOTATION};
use crate::error::Error;
use crate::identity::{
    DiscoveredGroup, DiscoveredResource, DiscoveredVersion, ResourceIdentity,
};
use crate::kinds::RegisteredKind;
use crate::object::GenericObject;
use crate::scale::ScaleClient;
use crate::watch::{EventSource, EventStream, ObjectEvent};
use crate::Result;

/// Discovery listing the two default Cluster API kinds
pub(crate) fn capi_discovery() -> Vec<DiscoveredGroup> {
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

fn test_object(
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

/// A MachineSet fixture in namespace "default"
pub(crate) fn machine_set(
    name: &str,
    replicas: i64,
    bounds: Option<(&str, &str)>,
) -> GenericObject {
    test_object("MachineSet", name, replicas, bounds)
}

/// A MachineDeployment fixture in namespace "default"
pub(crate) fn machine_deployment(
    name: &str,
    replicas: i64,
    bounds: Option<(&str, &str)>,
) -> GenericObject {
    test_object("MachineDeployment", name, replicas, bounds)
}

/// Event source fed by hand from the test body.
///
/// Each `events()` call registers a fresh channel; events are routed to
/// every stream opened for the object's kind.
pub(crate) struct ChannelEventSource {
    senders: Mutex<HashMap<String, Vec<UnboundedSender<Result<ObjectEvent>>>>>,
}

impl ChannelEventSource {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn send(&self, event: ObjectEvent) {
        let kind = event
            .object()
            .kind()
            .expect("fixture objects declare a kind")
            .to_string();
        let senders = self.senders.lock().expect("sender lock poisoned");
        for tx in senders.get(&kind).into_iter().flatten() {
            let _ = tx.send(Ok(event.clone()));
        }
    }

    pub(crate) fn applied(&self, object: GenericObject) {
        self.send(ObjectEvent::Applied(object));
    }

    pub(crate) fn deleted(&self, object: GenericObject) {
        self.send(ObjectEvent::Deleted(object));
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn events(&self, entry: &RegisteredKind, _namespace: Option<&str>) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .expect("sender lock poisoned")
            .entry(entry.kind.clone())
            .or_default()
            .push(tx);

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }
}

/// Scale client for tests that never reach the authoritative store
pub(crate) struct NullScaleClient;

#[async_trait]
impl ScaleClient for NullScaleClient {
    async fn get_scale(
        &self,
        _identity: &ResourceIdentity,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Scale> {
        Err(Error::validation(format!(
            "no scale client wired for {} {}/{} in this test",
            kind, namespace, name
        )))
    }

    async fn update_scale(
        &self,
        _identity: &ResourceIdentity,
        kind: &str,
        namespace: &str,
        name: &str,
        _scale: &Scale,
    ) -> Result<Scale> {
        Err(Error::validation(format!(
            "no scale client wired for {} {}/{} in this test",
            kind, namespace, name
        )))
    }
}
