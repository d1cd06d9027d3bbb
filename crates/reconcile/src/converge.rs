//! Owned CRUD with convergence: every write is gated on the ownership label
//! and followed by a bounded wait until the store reflects it.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::core::DynamicObject;
use metrics::counter;
use operand_core::labels::{ensure_annotations, ensure_labels, is_owned, is_retained, stamp_owned, HASH_ANNOTATION};
use operand_core::merge::merge_spec;
use operand_core::object::{annotation, generation_of, overlay_fields, set_spec, spec_of};
use operand_core::{ObjectRef, ReconcileError};
use operand_store::ObjectStore;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::poll::{poll_until, PollError};
use crate::settings::Settings;

/// What a delete-with-convergence call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Absent,
    /// Left in place: not owned, or owned and retained.
    Skipped,
}

#[derive(Clone)]
pub struct Converger {
    store: Arc<dyn ObjectStore>,
    settings: Arc<Settings>,
}

fn timeout_err<'a>(
    action: &'static str,
    target: &'a ObjectRef,
) -> impl FnOnce(PollError<ReconcileError>) -> ReconcileError + 'a {
    move |e| match e {
        PollError::TimedOut(waited) => ReconcileError::Timeout { action, target: target.clone(), waited },
        PollError::Condition(e) => e,
    }
}

impl Converger {
    pub fn new(store: Arc<dyn ObjectStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        &*self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stamp ownership and create; an existing object counts as created.
    pub async fn create_owned(&self, mut obj: DynamicObject) -> Result<(), ReconcileError> {
        stamp_owned(&mut obj.metadata);
        obj.metadata.resource_version = None;
        obj.metadata.uid = None;
        self.store.create_if_absent(&obj).await?;
        if let Some(target) = ObjectRef::from_object(&obj) {
            info!(kind = %target.kind, ns = ?target.namespace, name = %target.name, "created");
            counter!("operand_created_total", 1u64, "kind" => target.kind);
        }
        Ok(())
    }

    /// Bring the stored spec to `merge(merge(template, stored), config)`.
    ///
    /// Unowned objects are left alone. A write conflict retries on the next
    /// tick with a fresh read.
    pub async fn update_custom_resource(
        &self,
        target: &ObjectRef,
        template_spec: &Json,
        config_spec: &Json,
    ) -> Result<(), ReconcileError> {
        let s = self.settings();
        poll_until(s.update_poll, s.update_timeout, || self.try_update_spec(target, template_spec, config_spec))
            .await
            .map_err(timeout_err("update", target))
    }

    async fn try_update_spec(&self, target: &ObjectRef, template_spec: &Json, config_spec: &Json) -> Result<bool, ReconcileError> {
        let existing = self.store.get(target).await?;
        if !is_owned(&existing.metadata) {
            debug!(%target, "not managed here; leaving spec alone");
            return Ok(true);
        }
        let stored = spec_of(&existing);
        let desired = merge_spec(&merge_spec(template_spec, &stored), config_spec);
        if desired == stored {
            return Ok(true);
        }
        let generation = generation_of(&existing);
        let mut next = existing;
        set_spec(&mut next, desired);
        if !self.write(target, &next).await? {
            return Ok(false);
        }
        self.log_generation(target, generation).await?;
        Ok(true)
    }

    /// Overlay `payload` and the given labels/annotations onto an owned
    /// auxiliary object. No write when nothing changes.
    pub async fn update_resource(
        &self,
        target: &ObjectRef,
        payload: Option<&Json>,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ReconcileError> {
        let s = self.settings();
        poll_until(s.update_poll, s.update_timeout, || self.try_update_resource(target, payload, labels, annotations))
            .await
            .map_err(timeout_err("update", target))
    }

    async fn try_update_resource(
        &self,
        target: &ObjectRef,
        payload: Option<&Json>,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<bool, ReconcileError> {
        let existing = self.store.get(target).await?;
        if !is_owned(&existing.metadata) {
            debug!(%target, "not managed here; leaving resource alone");
            return Ok(true);
        }
        let mut next = existing.clone();
        if let Some(payload) = payload {
            overlay_fields(&mut next, payload);
        }
        ensure_labels(&mut next.metadata, labels);
        ensure_annotations(&mut next.metadata, annotations);
        if next.data == existing.data && next.metadata == existing.metadata {
            return Ok(true);
        }
        let generation = generation_of(&existing);
        if !self.write(target, &next).await? {
            return Ok(false);
        }
        self.log_generation(target, generation).await?;
        Ok(true)
    }

    /// `Ok(false)` on a write conflict.
    async fn write(&self, target: &ObjectRef, obj: &DynamicObject) -> Result<bool, ReconcileError> {
        match self.store.update(obj).await {
            Ok(_) => {
                counter!("operand_updated_total", 1u64, "kind" => target.kind.clone());
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                debug!(%target, "update conflict; retrying with a fresh read");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn log_generation(&self, target: &ObjectRef, before: Option<i64>) -> Result<(), ReconcileError> {
        let fresh = self.store.get(target).await?;
        let after = generation_of(&fresh);
        if after == before {
            debug!(%target, ?after, "updated; generation unchanged");
        } else {
            info!(%target, ?before, ?after, "updated");
        }
        Ok(())
    }

    /// Delete an owned, unretained object and wait until it is gone.
    ///
    /// Objects of the owner kind are not waited on.
    pub async fn delete_with_convergence(&self, target: &ObjectRef) -> Result<DeleteOutcome, ReconcileError> {
        let Some(existing) = self.store.get_opt(target).await? else {
            debug!(%target, "already gone");
            return Ok(DeleteOutcome::Absent);
        };
        if !is_owned(&existing.metadata) {
            info!(%target, "not managed here; not deleting");
            return Ok(DeleteOutcome::Skipped);
        }
        if is_retained(&existing.metadata) {
            info!(%target, "marked do-not-uninstall; not deleting");
            return Ok(DeleteOutcome::Skipped);
        }
        self.store.delete_if_present(target).await?;
        counter!("operand_deleted_total", 1u64, "kind" => target.kind.clone());
        if self.settings.is_owner_kind(&target.kind) {
            return Ok(DeleteOutcome::Deleted);
        }
        let s = self.settings();
        poll_until(s.delete_poll, s.delete_timeout, || self.is_gone(target))
            .await
            .map_err(timeout_err("delete", target))?;
        info!(%target, "deleted");
        Ok(DeleteOutcome::Deleted)
    }

    async fn is_gone(&self, target: &ObjectRef) -> Result<bool, ReconcileError> {
        Ok(self.store.get_opt(target).await?.is_none())
    }

    /// Replace `existing` by `desired` when their content hashes differ.
    ///
    /// Returns whether a replacement happened. A retained object is kept.
    pub async fn replace_on_change(&self, existing: &DynamicObject, desired: DynamicObject) -> Result<bool, ReconcileError> {
        let Some(target) = ObjectRef::from_object(&desired) else {
            return Ok(false);
        };
        let current = annotation(&existing.metadata, HASH_ANNOTATION);
        let wanted = annotation(&desired.metadata, HASH_ANNOTATION);
        if current == wanted {
            debug!(%target, "content hash unchanged");
            return Ok(false);
        }
        match self.delete_with_convergence(&target).await? {
            DeleteOutcome::Skipped => Ok(false),
            DeleteOutcome::Deleted | DeleteOutcome::Absent => {
                info!(%target, ?current, ?wanted, "content changed; recreating");
                self.create_owned(desired).await?;
                Ok(true)
            }
        }
    }
}
