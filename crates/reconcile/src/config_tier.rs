//! Operands without an explicit kind: join the operator's template examples
//! with its default configuration.

use std::collections::BTreeMap;

use kube::core::DynamicObject;
use operand_core::labels::is_owned;
use operand_core::merge::{merge_layers, merge_spec};
use operand_core::model::{ConfigService, InstallStatus};
use operand_core::object::{api_version_of, kind_of, name_of, set_spec};
use operand_core::{ErrorList, ObjectRef};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::batch::delete_batch;
use crate::converge::Converger;
use crate::resources::reconcile_resources;

/// Template spec, or `None` for examples that carry none.
fn template_spec(template: &DynamicObject) -> Option<&Json> {
    template.data.get("spec").filter(|s| !s.is_null())
}

fn template_target(template: &DynamicObject, namespace: &str) -> Option<ObjectRef> {
    let name = name_of(template);
    if name.is_empty() || kind_of(template).is_empty() {
        return None;
    }
    Some(ObjectRef::new(api_version_of(template), kind_of(template), Some(namespace), name))
}

fn instantiate(template: &DynamicObject, namespace: &str, spec: Json) -> DynamicObject {
    let mut obj = template.clone();
    obj.metadata.namespace = Some(namespace.to_string());
    set_spec(&mut obj, spec);
    obj
}

/// Converge the custom resources and auxiliary resources of one configured
/// operator living in `namespace`. `overrides` is the request's own spec,
/// layered over template and configuration.
pub async fn reconcile_with_config(
    conv: &Converger,
    operator: &str,
    namespace: &str,
    service: &ConfigService,
    install: &InstallStatus,
    overrides: Option<&Json>,
) -> Result<(), ErrorList> {
    let none = Json::Null;
    let overrides = overrides.unwrap_or(&none);
    reconcile_resources(conv, operator, namespace, service).await?;

    let templates = install.template_examples(operator)?;
    let mut found: BTreeMap<String, bool> = service.spec.keys().map(|k| (k.clone(), false)).collect();
    let mut errs = ErrorList::new();

    for template in &templates {
        let Some(t_spec) = template_spec(template) else { continue };
        let Some(target) = template_target(template, namespace) else {
            warn!(operator, "template example without kind or name; skipped");
            continue;
        };
        let matching: Vec<(&str, &Json)> = service.specs_for_kind(&target.kind).collect();
        for (declared, _) in &matching {
            found.insert(declared.to_string(), true);
        }

        let existing = match conv.store().get_opt(&target).await {
            Ok(existing) => existing,
            Err(e) => {
                errs.push(e);
                continue;
            }
        };
        match existing {
            None => {
                for (_, c_spec) in &matching {
                    let obj = instantiate(template, namespace, merge_layers(t_spec, c_spec, overrides));
                    if let Err(e) = conv.create_owned(obj).await {
                        errs.push(e);
                    }
                }
            }
            Some(obj) if is_owned(&obj.metadata) => {
                if matching.is_empty() {
                    info!(%target, operator, "kind no longer configured; removing");
                    if let Err(e) = conv.delete_with_convergence(&target).await {
                        errs.push(e);
                    }
                }
                for (_, c_spec) in &matching {
                    let desired = merge_spec(c_spec, overrides);
                    if let Err(e) = conv.update_custom_resource(&target, t_spec, &desired).await {
                        errs.push(e);
                    }
                }
            }
            Some(_) => debug!(%target, "custom resource not managed here; skipped"),
        }
    }

    for (kind, matched) in &found {
        if !matched {
            warn!(operator, kind, "no template example for configured kind");
        }
    }
    errs.into_result()
}

/// Delete the owned custom resources instantiated from templates whose kind
/// the configuration declares.
pub async fn delete_configured(
    conv: &Converger,
    operator: &str,
    namespace: &str,
    service: &ConfigService,
    install: &InstallStatus,
) -> Result<(), ErrorList> {
    let templates = install.template_examples(operator)?;
    let items: Vec<((), ObjectRef)> = templates
        .iter()
        .filter_map(|t| template_target(t, namespace))
        .filter(|target| service.declares_kind(&target.kind))
        .map(|target| ((), target))
        .collect();
    let (_, errs) = delete_batch(conv, items).await;
    errs.into_result()
}
