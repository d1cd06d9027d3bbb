//! Operands naming an explicit kind: the request carries the whole spec.

use operand_core::labels::is_owned;
use operand_core::model::Operand;
use operand_core::object::set_spec;
use operand_core::status::OperandCrMember;
use operand_core::{ObjectRef, ReconcileError};
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::converge::Converger;
use crate::status::StatusHandle;

/// Create or update the custom resource requested by `operand`, the
/// `index`-th operand of its entry, in the request's namespace.
pub async fn reconcile_with_request(
    conv: &Converger,
    status: &StatusHandle,
    request_name: &str,
    namespace: &str,
    operand: &Operand,
    index: usize,
) -> Result<(), ReconcileError> {
    let Some(kind) = operand.explicit_kind() else {
        return Err(ReconcileError::validation(&operand.name, "custom resource", "kind"));
    };
    let api_version = match operand.api_version.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => return Err(ReconcileError::validation(&operand.name, "custom resource", "apiVersion")),
    };
    let name = operand.instance_name_for(request_name, index);
    let target = ObjectRef::new(api_version, kind, Some(namespace), &name);
    let raw = operand.spec.clone().filter(|s| !s.is_null()).unwrap_or_else(|| json!({}));

    match conv.store().get_opt(&target).await? {
        None => {
            let mut obj = target.to_bare();
            set_spec(&mut obj, raw);
            conv.create_owned(obj).await?;
            status.add_cr(
                &operand.name,
                OperandCrMember { name, kind: kind.to_string(), api_version: api_version.to_string() },
            );
            Ok(())
        }
        Some(existing) if is_owned(&existing.metadata) => {
            conv.update_custom_resource(&target, &Json::Object(Default::default()), &raw).await
        }
        Some(_) => {
            debug!(%target, operand = %operand.name, "custom resource not managed here; skipped");
            Ok(())
        }
    }
}
