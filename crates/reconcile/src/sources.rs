//! Collaborators consulted during a pass: registries, default configuration
//! and operator installation status.

use std::path::Path;

use anyhow::{Context, Result};
use operand_core::model::{InstallStatus, OperandConfig, OperandRegistry, RegistryKey, RegistryOperator};
use serde::{Deserialize, Serialize};

#[async_trait::async_trait]
pub trait RegistrySource: Send + Sync {
    async fn registry(&self, key: &RegistryKey) -> Result<Option<OperandRegistry>>;
}

/// Default configuration, stored under the same key as its registry.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    async fn config(&self, key: &RegistryKey) -> Result<Option<OperandConfig>>;
}

#[async_trait::async_trait]
pub trait ReadinessSource: Send + Sync {
    /// `None` when the operator is not installed in `namespace`.
    async fn install_status(&self, operator: &RegistryOperator, namespace: &str) -> Result<Option<InstallStatus>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInstall {
    pub operator: String,
    pub namespace: String,
    pub status: InstallStatus,
}

/// Fixed registries, configs and install records, e.g. loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub registries: Vec<OperandRegistry>,
    #[serde(default)]
    pub configs: Vec<OperandConfig>,
    #[serde(default)]
    pub installs: Vec<CatalogInstall>,
}

impl StaticCatalog {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("parsing catalog")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("in {}", path.display()))
    }
}

#[async_trait::async_trait]
impl RegistrySource for StaticCatalog {
    async fn registry(&self, key: &RegistryKey) -> Result<Option<OperandRegistry>> {
        Ok(self.registries.iter().find(|r| r.key() == *key).cloned())
    }
}

#[async_trait::async_trait]
impl ConfigSource for StaticCatalog {
    async fn config(&self, key: &RegistryKey) -> Result<Option<OperandConfig>> {
        Ok(self.configs.iter().find(|c| c.name == key.name && c.namespace == key.namespace).cloned())
    }
}

#[async_trait::async_trait]
impl ReadinessSource for StaticCatalog {
    async fn install_status(&self, operator: &RegistryOperator, namespace: &str) -> Result<Option<InstallStatus>> {
        Ok(self
            .installs
            .iter()
            .find(|i| i.operator == operator.name && i.namespace == namespace)
            .map(|i| i.status.clone()))
    }
}
