//! Schema-less object view with typed path access
//!
//! [`GenericObject`] is the local representation of one watched resource
//! instance: declared type metadata, standard object metadata, and the rest
//! of the attribute tree kept as raw JSON. The wire layout matches what the
//! API server serves for any resource kind, so one representation covers
//! every kind the registry supports.
//!
//! Path accessors make "absent" and "malformed" distinguishable: `Ok(None)`
//! means the field is not there, `Err(TypeMismatch)` means something is there
//! but does not have the shape the caller asked for.

use std::borrow::Cow;

use kube::api::ObjectMeta;
use kube::core::{DynamicResourceScope, TypeMeta};
use kube::discovery::ApiResource;
use kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// One resource instance as a schema-less attribute tree.
///
/// Instances held in the controller caches are exclusively owned by their
/// cache slot; every copy handed out is an independent snapshot and is never
/// mutated in place by this crate after creation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GenericObject {
    /// The type fields (apiVersion, kind); not always present on the wire
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,

    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All other keys (spec, status, ...)
    #[serde(flatten)]
    pub data: Value,
}

impl GenericObject {
    /// Declared Kind, if present
    pub fn kind(&self) -> Option<&str> {
        self.types.as_ref().map(|t| t.kind.as_str())
    }

    /// Declared apiVersion ("group/version" or bare "version"), if present
    pub fn api_version(&self) -> Option<&str> {
        self.types.as_ref().map(|t| t.api_version.as_str())
    }

    /// Object name, if present
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// Object namespace, if present
    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// Resource version from the last authoritative read, if present
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Whether a deletion timestamp has been set on the object
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Look up an annotation value by key
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Walk `path` through the attribute tree.
    ///
    /// `Ok(None)` when any segment is absent; `Err(TypeMismatch)` when an
    /// intermediate node exists but is not a mapping.
    fn nested(&self, path: &[&str]) -> Result<Option<&Value>> {
        let mut current = &self.data;
        for (i, segment) in path.iter().enumerate() {
            let map = current.as_object().ok_or_else(|| {
                // the node we tried to traverse through is the parent, not
                // the current segment
                Error::type_mismatch(&path[..i], "mapping")
            })?;
            match map.get(*segment) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Read an integer leaf at `path`.
    pub fn nested_i64(&self, path: &[&str]) -> Result<Option<i64>> {
        match self.nested(path)? {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| Error::type_mismatch(path, "i64")),
        }
    }

    /// Read a string leaf at `path`.
    pub fn nested_str(&self, path: &[&str]) -> Result<Option<&str>> {
        match self.nested(path)? {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| Error::type_mismatch(path, "string")),
        }
    }

    /// Return a copy of this object with the replica field at `path` set to
    /// `replicas`, creating intermediate mappings as needed.
    ///
    /// The receiver is left untouched; the result is ready for an update
    /// call against the authoritative store.
    pub fn with_replicas(&self, path: &[&str], replicas: i64) -> Result<GenericObject> {
        let mut updated = self.clone();
        if !updated.data.is_object() {
            if updated.data.is_null() {
                updated.data = Value::Object(serde_json::Map::new());
            } else {
                return Err(Error::type_mismatch(&[], "mapping"));
            }
        }

        let (leaf, parents) = path
            .split_last()
            .ok_or_else(|| Error::validation("replica path must not be empty"))?;

        let mut current = updated
            .data
            .as_object_mut()
            .expect("data was just ensured to be a mapping");
        for (i, segment) in parents.iter().enumerate() {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            current = entry
                .as_object_mut()
                .ok_or_else(|| Error::type_mismatch(&path[..=i], "mapping"))?;
        }
        current.insert(leaf.to_string(), Value::from(replicas));
        Ok(updated)
    }
}

impl Resource for GenericObject {
    type DynamicType = ApiResource;
    type Scope = DynamicResourceScope;

    fn group(dt: &ApiResource) -> Cow<'_, str> {
        dt.group.as_str().into()
    }

    fn version(dt: &ApiResource) -> Cow<'_, str> {
        dt.version.as_str().into()
    }

    fn kind(dt: &ApiResource) -> Cow<'_, str> {
        dt.kind.as_str().into()
    }

    fn api_version(dt: &ApiResource) -> Cow<'_, str> {
        dt.api_version.as_str().into()
    }

    fn plural(dt: &ApiResource) -> Cow<'_, str> {
        dt.plural.as_str().into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
