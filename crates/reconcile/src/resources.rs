//! Auxiliary objects declared next to an operator's custom resources
//! (config maps, jobs, secrets ...).

use std::collections::BTreeMap;

use kube::core::DynamicObject;
use operand_core::labels::{ensure_annotations, ensure_labels, is_owned, HASH_ANNOTATION};
use operand_core::model::{ConfigResource, ConfigService};
use operand_core::naming::content_hash;
use operand_core::object::overlay_fields;
use operand_core::{ErrorList, ObjectRef, ReconcileError};
use tracing::{debug, info};

use crate::batch::delete_batch;
use crate::converge::Converger;

/// The object `res` describes, before ownership is stamped.
fn desired_object(conv: &Converger, res: &ConfigResource, target: &ObjectRef) -> DynamicObject {
    let mut obj = target.to_bare();
    if let Some(data) = res.data.as_ref() {
        overlay_fields(&mut obj, data);
    }
    ensure_labels(&mut obj.metadata, &res.labels);
    ensure_annotations(&mut obj.metadata, &res.annotations);
    if conv.settings().is_immutable(&res.kind) {
        let hash = BTreeMap::from([(HASH_ANNOTATION.to_string(), content_hash(res.data.as_ref()))]);
        ensure_annotations(&mut obj.metadata, &hash);
    }
    obj
}

async fn reconcile_one(conv: &Converger, res: &ConfigResource, target: &ObjectRef) -> Result<(), ReconcileError> {
    match conv.store().get_opt(target).await? {
        None => conv.create_owned(desired_object(conv, res, target)).await,
        Some(existing) if is_owned(&existing.metadata) && res.force => {
            if conv.settings().is_immutable(&res.kind) {
                conv.replace_on_change(&existing, desired_object(conv, res, target)).await?;
                Ok(())
            } else {
                conv.update_resource(target, res.data.as_ref(), &res.labels, &res.annotations).await
            }
        }
        Some(_) => {
            debug!(%target, force = res.force, "existing resource left as is");
            Ok(())
        }
    }
}

/// Create or refresh every auxiliary resource of `service`.
///
/// A descriptor missing apiVersion, kind or name stops the walk; store
/// failures are collected and the remaining descriptors still run.
pub async fn reconcile_resources(conv: &Converger, operator: &str, namespace: &str, service: &ConfigService) -> Result<(), ErrorList> {
    let mut errs = ErrorList::new();
    for res in &service.resources {
        if let Err(e) = res.validate(operator) {
            errs.push(e);
            return Err(errs);
        }
        let target = res.target(namespace);
        if let Err(e) = reconcile_one(conv, res, &target).await {
            errs.push(e);
        }
    }
    errs.into_result()
}

/// Delete every owned auxiliary resource of `service`, concurrently.
pub async fn delete_resources(conv: &Converger, operator: &str, namespace: &str, service: &ConfigService) -> Result<(), ErrorList> {
    let mut errs = ErrorList::new();
    let mut items = Vec::new();
    for res in &service.resources {
        match res.validate(operator) {
            Ok(()) => items.push(((), res.target(namespace))),
            Err(e) => errs.push(e),
        }
    }
    if !errs.is_empty() {
        return Err(errs);
    }
    let count = items.len();
    let (_, errs) = delete_batch(conv, items).await;
    info!(operator, count, failed = errs.len(), "auxiliary resources torn down");
    errs.into_result()
}
