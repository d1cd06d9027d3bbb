//! Object store adapter: get/create/update/delete by
//! `(apiVersion, kind, namespace, name)`.
//!
//! Not-found is reported as [`StoreError::NotFound`] so callers can pick the
//! create path; the provided helpers fold "already exists" on create and
//! "not found" on delete into success.

#![forbid(unsafe_code)]

use kube::core::DynamicObject;
use operand_core::{ObjectRef, StoreError};

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fresh read; never served from a cache.
    async fn get(&self, target: &ObjectRef) -> Result<DynamicObject, StoreError>;

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace the stored object. A stale `resourceVersion` yields
    /// [`StoreError::Conflict`].
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, target: &ObjectRef) -> Result<(), StoreError>;

    async fn get_opt(&self, target: &ObjectRef) -> Result<Option<DynamicObject>, StoreError> {
        match self.get(target).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create, treating an existing object as success.
    async fn create_if_absent(&self, obj: &DynamicObject) -> Result<(), StoreError> {
        match self.create(obj).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete, treating a missing object as success.
    async fn delete_if_present(&self, target: &ObjectRef) -> Result<(), StoreError> {
        match self.delete(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Identity of `obj`, or a backend error when it lacks type or name.
pub(crate) fn target_of(verb: operand_core::Verb, obj: &DynamicObject) -> Result<ObjectRef, StoreError> {
    ObjectRef::from_object(obj).ok_or_else(|| {
        let placeholder = ObjectRef::new("", "", obj.metadata.namespace.as_deref(), obj.metadata.name.as_deref().unwrap_or(""));
        StoreError::backend(verb, &placeholder, "object missing apiVersion, kind or metadata.name")
    })
}
