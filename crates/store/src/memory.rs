//! In-memory store for tests and offline runs.
//!
//! Tracks `resourceVersion` and `generation` like an API server would, can
//! inject failures per verb and object name, can keep deleted objects
//! visible for a number of reads, and journals every mutation.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use kube::core::DynamicObject;
use operand_core::{ObjectRef, StoreError, Verb};

use crate::{target_of, ObjectStore};

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectRef, DynamicObject>,
    next_rv: u64,
    failures: Vec<(Verb, String)>,
    /// Updates left to reject with a conflict, per object name.
    conflicts: BTreeMap<String, u32>,
    delete_lag: u32,
    /// Deleted objects still visible, with the reads left before they vanish.
    terminating: BTreeMap<ObjectRef, u32>,
    journal: Vec<(Verb, ObjectRef)>,
}

impl Inner {
    fn bump_rv(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn check_failure(&self, verb: Verb, target: &ObjectRef) -> Result<(), StoreError> {
        if self.failures.iter().any(|(v, name)| *v == verb && *name == target.name) {
            return Err(StoreError::backend(verb, target, "injected failure"));
        }
        Ok(())
    }

    fn check_conflict(&mut self, target: &ObjectRef) -> Result<(), StoreError> {
        let Some(left) = self.conflicts.get_mut(&target.name) else { return Ok(()) };
        if *left == 0 {
            return Ok(());
        }
        *left -= 1;
        Err(StoreError::Conflict { verb: Verb::Update, target: target.clone(), message: "injected conflict".to_string() })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object without journaling it. Objects without identity are ignored.
    pub fn insert(&self, mut obj: DynamicObject) {
        let Some(target) = ObjectRef::from_object(&obj) else { return };
        let mut inner = self.lock();
        obj.metadata.resource_version = Some(inner.bump_rv());
        obj.metadata.generation.get_or_insert(1);
        obj.metadata.uid.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
        inner.objects.insert(target, obj);
    }

    /// Every `verb` on an object called `name` fails with a backend error.
    pub fn fail_on(&self, verb: Verb, name: &str) {
        self.lock().failures.push((verb, name.to_string()));
    }

    /// The next `times` updates of an object called `name` conflict.
    pub fn conflict_on_update(&self, name: &str, times: u32) {
        self.lock().conflicts.insert(name.to_string(), times);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failures.clear();
        inner.conflicts.clear();
    }

    /// Deleted objects stay readable for `reads` further gets.
    pub fn set_delete_lag(&self, reads: u32) {
        self.lock().delete_lag = reads;
    }

    pub fn object(&self, target: &ObjectRef) -> Option<DynamicObject> {
        self.lock().objects.get(target).cloned()
    }

    pub fn contains(&self, target: &ObjectRef) -> bool {
        self.lock().objects.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutations performed through the store API, in order.
    pub fn journal(&self) -> Vec<(Verb, ObjectRef)> {
        self.lock().journal.clone()
    }

    pub fn count(&self, verb: Verb) -> usize {
        self.lock().journal.iter().filter(|(v, _)| *v == verb).count()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, target: &ObjectRef) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.check_failure(Verb::Get, target)?;
        if let Some(left) = inner.terminating.get_mut(target) {
            if *left == 0 {
                inner.terminating.remove(target);
                inner.objects.remove(target);
            } else {
                *left -= 1;
            }
        }
        inner.objects.get(target).cloned().ok_or_else(|| StoreError::NotFound(target.clone()))
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let target = target_of(Verb::Create, obj)?;
        let mut inner = self.lock();
        inner.check_failure(Verb::Create, &target)?;
        if inner.objects.contains_key(&target) {
            return Err(StoreError::AlreadyExists(target));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(inner.bump_rv());
        stored.metadata.generation = Some(1);
        stored.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        inner.objects.insert(target.clone(), stored.clone());
        inner.journal.push((Verb::Create, target));
        Ok(stored)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let target = target_of(Verb::Update, obj)?;
        let mut inner = self.lock();
        inner.check_failure(Verb::Update, &target)?;
        inner.check_conflict(&target)?;
        let current = inner.objects.get(&target).cloned().ok_or_else(|| StoreError::NotFound(target.clone()))?;
        if let Some(rv) = obj.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(rv) {
                return Err(StoreError::Conflict {
                    verb: Verb::Update,
                    target,
                    message: format!("resourceVersion {} is stale", rv),
                });
            }
        }
        let mut stored = obj.clone();
        let generation = current.metadata.generation.unwrap_or(1);
        stored.metadata.generation = Some(if current.data != obj.data { generation + 1 } else { generation });
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.resource_version = Some(inner.bump_rv());
        inner.objects.insert(target.clone(), stored.clone());
        inner.journal.push((Verb::Update, target));
        Ok(stored)
    }

    async fn delete(&self, target: &ObjectRef) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_failure(Verb::Delete, target)?;
        if !inner.objects.contains_key(target) || inner.terminating.contains_key(target) {
            return Err(StoreError::NotFound(target.clone()));
        }
        inner.journal.push((Verb::Delete, target.clone()));
        if inner.delete_lag == 0 {
            inner.objects.remove(target);
        } else {
            let lag = inner.delete_lag;
            inner.terminating.insert(target.clone(), lag);
        }
        Ok(())
    }
}
