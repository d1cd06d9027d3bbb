//! One reconciliation pass over an operand request.
//!
//! Orphaned request-tier resources go first; failures there are collected
//! like any other. Then each request entry is resolved against its registry
//! and every operand is driven through the operator readiness gate into the
//! config tier or the request tier.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use operand_core::model::{
    ConfigService, InstallPhase, Operand, OperandConfig, OperandRegistry, OperandRequest, RegistryKey, RegistryOperator,
};
use operand_core::status::{OperandCrMember, OperatorPhase, ServicePhase};
use operand_core::{ErrorList, ObjectRef, ReconcileError};
use operand_store::ObjectStore;
use tracing::{debug, info, warn};

use crate::batch::delete_batch;
use crate::config_tier::{delete_configured, reconcile_with_config};
use crate::converge::Converger;
use crate::request_tier::reconcile_with_request;
use crate::resources::delete_resources;
use crate::settings::Settings;
use crate::sources::{ConfigSource, ReadinessSource, RegistrySource, StaticCatalog};
use crate::status::StatusHandle;

type Recorded = (String, OperandCrMember);

pub struct Reconciler {
    conv: Converger,
    registries: Arc<dyn RegistrySource>,
    configs: Arc<dyn ConfigSource>,
    readiness: Arc<dyn ReadinessSource>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        settings: Settings,
        registries: Arc<dyn RegistrySource>,
        configs: Arc<dyn ConfigSource>,
        readiness: Arc<dyn ReadinessSource>,
    ) -> Self {
        Self { conv: Converger::new(store, Arc::new(settings)), registries, configs, readiness }
    }

    /// All three collaborators answered by one catalog.
    pub fn with_catalog(store: Arc<dyn ObjectStore>, settings: Settings, catalog: Arc<StaticCatalog>) -> Self {
        Self::new(store, settings, catalog.clone(), catalog.clone(), catalog)
    }

    pub fn converger(&self) -> &Converger {
        &self.conv
    }

    /// Run one pass and write the resulting status back onto `request`.
    pub async fn reconcile(&self, request: &mut OperandRequest) -> Result<(), ErrorList> {
        let started = Instant::now();
        info!(ns = %request.namespace, name = %request.name, "reconciling operands");
        let status = StatusHandle::new(std::mem::take(&mut request.status));
        let result = self.run_pass(request, &status).await;
        request.status = status.snapshot();
        request.status.update_cluster_phase();
        histogram!("operand_reconcile_ms", started.elapsed().as_secs_f64() * 1000.0);
        match &result {
            Ok(()) => info!(ns = %request.namespace, name = %request.name, phase = ?request.status.phase, "operands reconciled"),
            Err(errs) => {
                counter!("operand_reconcile_errors_total", errs.len() as u64);
                warn!(ns = %request.namespace, name = %request.name, errors = errs.len(), "pass finished with errors");
            }
        }
        result
    }

    async fn run_pass(&self, request: &OperandRequest, status: &StatusHandle) -> Result<(), ErrorList> {
        let mut errs = ErrorList::new();
        if let Err(e) = self.check_custom_resources(request, status).await {
            errs.append(e);
        }

        for entry in &request.spec.requests {
            let key = request.registry_key(entry);
            let registry = match self.lookup_registry(&key).await {
                Ok(registry) => registry,
                Err(e) => {
                    errs.push(e);
                    continue;
                }
            };
            for (index, operand) in entry.operands.iter().enumerate() {
                if let Err(e) = self.reconcile_operand(request, &key, &registry, operand, index, status).await {
                    errs.append(e);
                }
            }
        }
        errs.into_result()
    }

    async fn reconcile_operand(
        &self,
        request: &OperandRequest,
        key: &RegistryKey,
        registry: &OperandRegistry,
        operand: &Operand,
        index: usize,
        status: &StatusHandle,
    ) -> Result<(), ErrorList> {
        let Some(operator) = registry.get_operator(&operand.name) else {
            warn!(operand = %operand.name, registry = %key, "operator not listed in registry; skipped");
            return Ok(());
        };
        let install_ns = operator.install_namespace(&self.conv.settings().cluster_operator_namespace);
        let install = match self.readiness.install_status(operator, install_ns).await {
            Ok(Some(install)) => install,
            Ok(None) => {
                warn!(operand = %operand.name, ns = install_ns, "operator not installed; skipped");
                return Ok(());
            }
            Err(source) => {
                status.set_member(&operand.name, Some(OperatorPhase::Failed), None);
                let key = format!("{}/{}", install_ns, operator.name);
                return Err(ReconcileError::Lookup { what: "install status", key, source }.into());
            }
        };
        match install.phase {
            InstallPhase::Installing => {
                debug!(operand = %operand.name, "operator still installing");
                status.set_member(&operand.name, Some(OperatorPhase::Installing), None);
                return Ok(());
            }
            InstallPhase::Failed => {
                status.set_member(&operand.name, Some(OperatorPhase::Failed), None);
                let namespace = install_ns.to_string();
                return Err(ReconcileError::InstallFailed { operator: operator.name.clone(), namespace }.into());
            }
            InstallPhase::Unknown => {
                warn!(operand = %operand.name, ns = install_ns, "operator installation state unknown");
                status.set_member(&operand.name, Some(OperatorPhase::Failed), None);
                return Ok(());
            }
            InstallPhase::Succeeded => {}
        }
        status.set_member(&operand.name, Some(OperatorPhase::Running), None);

        let result = match operand.explicit_kind() {
            None => {
                let Some(config) = self.lookup_config(key).await? else {
                    debug!(config = %key, "no default configuration");
                    return Ok(());
                };
                let Some(service) = config.get_service(&operand.name) else {
                    debug!(operand = %operand.name, config = %key, "no configured service; nothing to create");
                    return Ok(());
                };
                reconcile_with_config(&self.conv, &operator.name, &operator.namespace, service, &install, operand.spec.as_ref())
                    .await
            }
            Some(_) => reconcile_with_request(&self.conv, status, &request.name, &request.namespace, operand, index)
                .await
                .map_err(ErrorList::from),
        };
        let phase = if result.is_err() { ServicePhase::Failed } else { ServicePhase::Running };
        status.set_member(&operand.name, None, Some(phase));
        result
    }

    async fn lookup_registry(&self, key: &RegistryKey) -> Result<OperandRegistry, ReconcileError> {
        match self.registries.registry(key).await {
            Ok(Some(registry)) => Ok(registry),
            Ok(None) => Err(ReconcileError::Missing { what: "registry", key: key.to_string() }),
            Err(source) => Err(ReconcileError::Lookup { what: "registry", key: key.to_string(), source }),
        }
    }

    async fn lookup_config(&self, key: &RegistryKey) -> Result<Option<OperandConfig>, ReconcileError> {
        self.configs
            .config(key)
            .await
            .map_err(|source| ReconcileError::Lookup { what: "config", key: key.to_string(), source })
    }

    /// Delete request-tier resources recorded in the status that the request
    /// no longer asks for.
    pub async fn check_custom_resources(&self, request: &OperandRequest, status: &StatusHandle) -> Result<(), ErrorList> {
        let desired: BTreeSet<(String, String, String)> = request
            .desired_crs()
            .into_iter()
            .map(|(operand, kind, name)| (operand, kind.to_ascii_lowercase(), name))
            .collect();
        let orphans: Vec<Recorded> = status
            .with(|s| s.recorded_crs())
            .into_iter()
            .filter(|(operand, cr)| !desired.contains(&(operand.clone(), cr.kind.to_ascii_lowercase(), cr.name.clone())))
            .collect();
        if orphans.is_empty() {
            return Ok(());
        }
        info!(ns = %request.namespace, name = %request.name, count = orphans.len(), "removing custom resources no longer requested");
        self.delete_recorded(&request.namespace, orphans, status).await
    }

    async fn delete_recorded(&self, namespace: &str, recorded: Vec<Recorded>, status: &StatusHandle) -> Result<(), ErrorList> {
        let items: Vec<(Recorded, ObjectRef)> = recorded
            .into_iter()
            .map(|(operand, cr)| {
                let target = ObjectRef::new(&cr.api_version, &cr.kind, Some(namespace), &cr.name);
                ((operand, cr), target)
            })
            .collect();
        let (done, errs) = delete_batch(&self.conv, items).await;
        status.with(|s| {
            for ((operand, cr), _) in &done {
                s.remove_member_cr(operand, &cr.name, &cr.kind);
            }
        });
        errs.into_result()
    }

    /// Remove everything reconciled for `operand`: its recorded request-tier
    /// resources, the owned custom resources created from its configuration
    /// and its auxiliary resources.
    pub async fn teardown_operand(&self, request: &mut OperandRequest, key: &RegistryKey, operand: &str) -> Result<(), ErrorList> {
        info!(ns = %request.namespace, name = %request.name, operand, "tearing down operand");
        let status = StatusHandle::new(std::mem::take(&mut request.status));
        let result = self.run_teardown(request, key, operand, &status).await;
        request.status = status.snapshot();
        request.status.update_cluster_phase();
        result
    }

    async fn run_teardown(&self, request: &OperandRequest, key: &RegistryKey, operand: &str, status: &StatusHandle) -> Result<(), ErrorList> {
        let recorded: Vec<Recorded> = status.with(|s| s.recorded_crs()).into_iter().filter(|(op, _)| op == operand).collect();
        self.delete_recorded(&request.namespace, recorded, status).await?;

        let registry = self.lookup_registry(key).await?;
        let Some(operator) = registry.get_operator(operand) else {
            warn!(operand, registry = %key, "operator not listed in registry; nothing more to remove");
            return Ok(());
        };
        let Some(config) = self.lookup_config(key).await? else { return Ok(()) };
        let Some(service) = config.get_service(operand) else { return Ok(()) };

        let mut errs = ErrorList::new();
        if let Err(e) = self.delete_from_templates(operator, service).await {
            errs.append(e);
        }
        if let Err(e) = delete_resources(&self.conv, &operator.name, &operator.namespace, service).await {
            errs.append(e);
        }
        errs.into_result()
    }

    async fn delete_from_templates(&self, operator: &RegistryOperator, service: &ConfigService) -> Result<(), ErrorList> {
        let install_ns = operator.install_namespace(&self.conv.settings().cluster_operator_namespace);
        match self.readiness.install_status(operator, install_ns).await {
            Ok(Some(install)) => delete_configured(&self.conv, &operator.name, &operator.namespace, service, &install).await,
            Ok(None) => {
                debug!(operator = %operator.name, "operator not installed; no templates to follow");
                Ok(())
            }
            Err(source) => {
                let key = format!("{}/{}", install_ns, operator.name);
                Err(ReconcileError::Lookup { what: "install status", key, source }.into())
            }
        }
    }
}
