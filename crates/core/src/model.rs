//! Desired-state documents: requests, registries, default configuration and
//! install status with packaged template examples.

use std::collections::BTreeMap;
use std::fmt;

use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ReconcileError;
use crate::naming::derive_instance_name;
use crate::object::ObjectRef;
use crate::status::RequestStatus;

/// One requested component instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operand {
    /// Operator name as listed in the registry.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    /// Raw override spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Json>,
}

impl Operand {
    /// Explicit target kind; empty strings count as unset.
    pub fn explicit_kind(&self) -> Option<&str> {
        self.kind.as_deref().filter(|k| !k.is_empty())
    }

    /// Name of the request-tier object for this operand at `index`.
    pub fn instance_name_for(&self, request_name: &str, index: usize) -> String {
        match self.instance_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => derive_instance_name(
                request_name,
                self.api_version.as_deref().unwrap_or(""),
                self.kind.as_deref().unwrap_or(""),
                index,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntry {
    pub registry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_namespace: Option<String>,
    #[serde(default)]
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub requests: Vec<RequestEntry>,
}

/// The aggregate whose operands are reconciled; carries the persisted status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperandRequest {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub spec: RequestSpec,
    #[serde(default)]
    pub status: RequestStatus,
}

impl OperandRequest {
    pub fn registry_key(&self, entry: &RequestEntry) -> RegistryKey {
        let namespace = entry
            .registry_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.namespace);
        RegistryKey::new(&entry.registry, namespace)
    }

    /// `(operand, kind, name)` of every request-tier object still desired.
    pub fn desired_crs(&self) -> Vec<(String, String, String)> {
        let mut out = Vec::new();
        for entry in &self.spec.requests {
            for (index, operand) in entry.operands.iter().enumerate() {
                if let Some(kind) = operand.explicit_kind() {
                    out.push((operand.name.clone(), kind.to_string(), operand.instance_name_for(&self.name, index)));
                }
            }
        }
        out
    }
}

/// `(name, namespace)` of a registry and of its same-named configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryKey {
    pub name: String,
    pub namespace: String,
}

impl RegistryKey {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self { name: name.to_string(), namespace: namespace.to_string() }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    #[default]
    Namespace,
    Cluster,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryOperator {
    pub name: String,
    /// Namespace the operands of this operator live in.
    pub namespace: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub install_mode: InstallMode,
}

impl RegistryOperator {
    /// Namespace the operator itself is installed into.
    pub fn install_namespace<'a>(&'a self, cluster_namespace: &'a str) -> &'a str {
        match self.install_mode {
            InstallMode::Cluster => cluster_namespace,
            InstallMode::Namespace => &self.namespace,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperandRegistry {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub operators: Vec<RegistryOperator>,
}

impl OperandRegistry {
    pub fn key(&self) -> RegistryKey {
        RegistryKey::new(&self.name, &self.namespace)
    }

    pub fn get_operator(&self, name: &str) -> Option<&RegistryOperator> {
        self.operators.iter().find(|o| o.name == name)
    }
}

/// Auxiliary object created alongside an operator's custom resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResource {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Keep an existing owned object in line with `data`.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

impl ConfigResource {
    pub fn validate(&self, operator: &str) -> Result<(), ReconcileError> {
        if self.api_version.is_empty() {
            return Err(ReconcileError::validation(operator, "k8s resource", "apiVersion"));
        }
        if self.kind.is_empty() {
            return Err(ReconcileError::validation(operator, "k8s resource", "kind"));
        }
        if self.name.is_empty() {
            return Err(ReconcileError::validation(operator, "k8s resource", "name"));
        }
        Ok(())
    }

    /// Target identity; the descriptor's namespace wins over `default_namespace`.
    pub fn target(&self, default_namespace: &str) -> ObjectRef {
        let ns = self.namespace.as_deref().filter(|ns| !ns.is_empty()).unwrap_or(default_namespace);
        ObjectRef::new(&self.api_version, &self.kind, Some(ns), &self.name)
    }
}

/// Default configuration of one operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigService {
    pub name: String,
    /// Custom-resource kind → default spec fragment.
    #[serde(default)]
    pub spec: BTreeMap<String, Json>,
    #[serde(default)]
    pub resources: Vec<ConfigResource>,
}

impl ConfigService {
    /// Declared kinds matching `kind`, ignoring ASCII case.
    pub fn specs_for_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = (&'a str, &'a Json)> + 'a {
        self.spec
            .iter()
            .filter(move |(declared, _)| declared.eq_ignore_ascii_case(kind))
            .map(|(declared, spec)| (declared.as_str(), spec))
    }

    pub fn declares_kind(&self, kind: &str) -> bool {
        self.specs_for_kind(kind).next().is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperandConfig {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub services: Vec<ConfigService>,
}

impl OperandConfig {
    pub fn get_service(&self, name: &str) -> Option<&ConfigService> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallPhase {
    Installing,
    Succeeded,
    Failed,
    Unknown,
}

/// Installation state of an operator as reported by the readiness source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallStatus {
    pub phase: InstallPhase,
    /// Packaged template examples: a raw JSON array of objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<String>,
}

impl InstallStatus {
    /// Parse the template examples. Absent or blank templates are an empty list.
    pub fn template_examples(&self, operator: &str) -> Result<Vec<DynamicObject>, ReconcileError> {
        let raw = match self.templates.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(Vec::new()),
        };
        serde_json::from_str(raw)
            .map_err(|source| ReconcileError::Templates { operator: operator.to_string(), source })
    }
}
