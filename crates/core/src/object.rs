//! Object identity and small accessors over `DynamicObject`.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Store operation, used to give errors and journals their context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Get,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Get => "get",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Identity of a managed object: `(apiVersion, kind, namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(|ns| ns.to_string()),
            name: name.to_string(),
        }
    }

    /// Identity of an existing object; `None` when type or name is missing.
    pub fn from_object(obj: &DynamicObject) -> Option<Self> {
        let types = obj.types.as_ref()?;
        let name = obj.metadata.name.as_deref()?;
        Some(Self::new(&types.api_version, &types.kind, obj.metadata.namespace.as_deref(), name))
    }

    /// Split `apiVersion` into `(group, version)`; the core group is empty.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = self.group_version();
        GroupVersionKind::gvk(group, version, &self.kind)
    }

    /// An empty object carrying only this identity.
    pub fn to_bare(&self) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta { api_version: self.api_version.clone(), kind: self.kind.clone() }),
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: self.namespace.clone(),
                ..Default::default()
            },
            data: Json::Object(serde_json::Map::new()),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{} {} {}", self.api_version, self.kind, self.name),
        }
    }
}

pub fn kind_of(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("")
}

pub fn api_version_of(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map(|t| t.api_version.as_str()).unwrap_or("")
}

pub fn name_of(obj: &DynamicObject) -> &str {
    obj.metadata.name.as_deref().unwrap_or("")
}

/// `.spec` of the object, or an empty document when unset.
pub fn spec_of(obj: &DynamicObject) -> Json {
    match obj.data.get("spec") {
        Some(Json::Null) | None => Json::Object(serde_json::Map::new()),
        Some(spec) => spec.clone(),
    }
}

pub fn set_spec(obj: &mut DynamicObject, spec: Json) {
    set_field(obj, "spec", spec);
}

/// Set a top-level field next to `metadata`.
pub fn set_field(obj: &mut DynamicObject, key: &str, value: Json) {
    if !obj.data.is_object() {
        obj.data = Json::Object(serde_json::Map::new());
    }
    if let Some(map) = obj.data.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

/// Copy the top-level keys of `payload` onto the object. Identity keys are
/// owned by the object itself and never taken from the payload.
pub fn overlay_fields(obj: &mut DynamicObject, payload: &Json) {
    let Some(fields) = payload.as_object() else { return };
    for (key, value) in fields {
        if matches!(key.as_str(), "apiVersion" | "kind" | "metadata") {
            continue;
        }
        set_field(obj, key, value.clone());
    }
}

pub fn generation_of(obj: &DynamicObject) -> Option<i64> {
    obj.metadata.generation
}

pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref().and_then(|a| a.get(key)).map(|v| v.as_str())
}
