use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use operand_core::merge::{merge_layers, merge_spec};
use operand_core::model::{OperandRequest, RegistryKey};
use operand_core::naming::derive_instance_name;
use operand_core::status::RequestStatus;
use operand_reconcile::settings::parse_kinds;
use operand_reconcile::{Reconciler, Settings, StaticCatalog};
use operand_store::KubeStore;
use serde_json::Value as Json;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "operandctl", version, about = "Operand lifecycle reconciler")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

/// Overrides on top of `OPERAND_*` settings.
#[derive(Args, Debug)]
struct Tuning {
    /// Kind of the owning aggregate (never waited on when deleted)
    #[arg(long = "owner-kind", global = true)]
    owner_kind: Option<String>,
    /// Comma-separated kinds replaced instead of updated
    #[arg(long = "immutable-kinds", global = true)]
    immutable_kinds: Option<String>,
    #[arg(long = "update-timeout-secs", global = true)]
    update_timeout_secs: Option<u64>,
    #[arg(long = "delete-timeout-secs", global = true)]
    delete_timeout_secs: Option<u64>,
    /// Install namespace of cluster-mode operators
    #[arg(long = "cluster-operator-ns", global = true)]
    cluster_operator_ns: Option<String>,
}

impl Tuning {
    fn settings(&self) -> Settings {
        let mut s = Settings::from_env();
        if let Some(kind) = &self.owner_kind {
            s.owner_kind = kind.clone();
        }
        if let Some(kinds) = &self.immutable_kinds {
            s.immutable_kinds = parse_kinds(kinds);
        }
        if let Some(secs) = self.update_timeout_secs {
            s.update_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.delete_timeout_secs {
            s.delete_timeout = Duration::from_secs(secs);
        }
        if let Some(ns) = &self.cluster_operator_ns {
            s.cluster_operator_namespace = ns.clone();
        }
        s
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the operands of a request against the current kube context
    Reconcile {
        /// Request document (YAML)
        #[arg(long = "request")]
        request: PathBuf,
        /// Registries, configs and install records (YAML)
        #[arg(long = "catalog")]
        catalog: PathBuf,
        /// Keep reconciling every N seconds until interrupted
        #[arg(long = "interval-secs")]
        interval_secs: Option<u64>,
        /// Write the updated status back into the request file
        #[arg(long = "write-status", action = ArgAction::SetTrue)]
        write_status: bool,
    },
    /// Remove everything reconciled for one operand
    Teardown {
        #[arg(long = "request")]
        request: PathBuf,
        #[arg(long = "catalog")]
        catalog: PathBuf,
        /// Operand (operator) name
        #[arg(long = "operand")]
        operand: String,
        /// Registry of the operand; defaults to the request entry listing it
        #[arg(long = "registry")]
        registry: Option<String>,
        #[arg(long = "registry-ns")]
        registry_ns: Option<String>,
        #[arg(long = "write-status", action = ArgAction::SetTrue)]
        write_status: bool,
    },
    /// Merge spec documents: BASE <- OVERLAY [<- OVERRIDE]
    Merge {
        base: PathBuf,
        overlay: PathBuf,
        #[arg(value_name = "OVERRIDE")]
        override_doc: Option<PathBuf>,
    },
    /// Print the derived name of a request-tier resource
    Name {
        #[arg(long = "request")]
        request: String,
        #[arg(long = "api-version")]
        api_version: String,
        #[arg(long = "kind")]
        kind: String,
        #[arg(long = "index", default_value_t = 0)]
        index: usize,
    },
}

fn init_tracing() {
    let env = std::env::var("OPERAND_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("OPERAND_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid OPERAND_METRICS_ADDR; expected host:port");
        }
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn write_request(path: &Path, request: &OperandRequest) -> Result<()> {
    let raw = serde_yaml::to_string(request)?;
    std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
}

fn print_status(output: Output, status: &RequestStatus) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(status)?),
        Output::Human => {
            println!("phase: {:?}", status.phase);
            for m in &status.members {
                let operator = m.phase.operator_phase.map(|p| format!("{:?}", p)).unwrap_or_else(|| "-".into());
                let service = m.phase.operand_phase.map(|p| format!("{:?}", p)).unwrap_or_else(|| "-".into());
                println!("{} • operator {} • service {} • {} custom resources", m.name, operator, service, m.operand_cr_list.len());
                for cr in &m.operand_cr_list {
                    println!("    {} {} {}", cr.api_version, cr.kind, cr.name);
                }
            }
        }
    }
    Ok(())
}

async fn reconciler(catalog: &Path, settings: Settings) -> Result<Reconciler> {
    let catalog = StaticCatalog::from_path(catalog)?;
    let store = KubeStore::try_default().await?;
    Ok(Reconciler::with_catalog(Arc::new(store), settings, Arc::new(catalog)))
}

/// Registry entry that lists `operand`.
fn registry_of(request: &OperandRequest, operand: &str) -> Result<RegistryKey> {
    request
        .spec
        .requests
        .iter()
        .find(|e| e.operands.iter().any(|o| o.name == operand))
        .map(|e| request.registry_key(e))
        .ok_or_else(|| anyhow!("operand {} is not part of request {}/{}", operand, request.namespace, request.name))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile { request: path, catalog, interval_secs, write_status } => {
            let mut request: OperandRequest = read_yaml(&path)?;
            let r = reconciler(&catalog, cli.tuning.settings()).await?;
            let Some(secs) = interval_secs else {
                let result = r.reconcile(&mut request).await;
                if write_status {
                    write_request(&path, &request)?;
                }
                print_status(cli.output, &request.status)?;
                return result.map_err(anyhow::Error::from);
            };
            let mut tick = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match r.reconcile(&mut request).await {
                            Ok(()) => info!(phase = ?request.status.phase, "pass complete"),
                            Err(errs) => warn!(errors = errs.len(), "pass failed: {}", errs),
                        }
                        if write_status {
                            write_request(&path, &request)?;
                        }
                        print_status(cli.output, &request.status)?;
                    }
                    _ = signal::ctrl_c() => {
                        info!("interrupted; stopping");
                        break;
                    }
                }
            }
        }
        Commands::Teardown { request: path, catalog, operand, registry, registry_ns, write_status } => {
            let mut request: OperandRequest = read_yaml(&path)?;
            let key = match registry {
                Some(name) => RegistryKey::new(&name, registry_ns.as_deref().unwrap_or(&request.namespace)),
                None => registry_of(&request, &operand)?,
            };
            let r = reconciler(&catalog, cli.tuning.settings()).await?;
            let result = r.teardown_operand(&mut request, &key, &operand).await;
            if write_status {
                write_request(&path, &request)?;
            }
            print_status(cli.output, &request.status)?;
            result.map_err(anyhow::Error::from)?;
        }
        Commands::Merge { base, overlay, override_doc } => {
            let base: Json = read_yaml(&base)?;
            let overlay: Json = read_yaml(&overlay)?;
            let merged = match override_doc {
                Some(path) => merge_layers(&base, &overlay, &read_yaml::<Json>(&path)?),
                None => merge_spec(&base, &overlay),
            };
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&merged)?),
                Output::Human => print!("{}", serde_yaml::to_string(&merged)?),
            }
        }
        Commands::Name { request, api_version, kind, index } => {
            println!("{}", derive_instance_name(&request, &api_version, &kind, index));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_finds_registry_of_operand() {
        let request: OperandRequest = serde_yaml::from_str(
            r#"
name: req
namespace: ns1
spec:
  requests:
    - registry: common-service
      registryNamespace: reg-ns
      operands:
        - name: etcd
"#,
        )
        .unwrap();
        assert_eq!(registry_of(&request, "etcd").unwrap(), RegistryKey::new("common-service", "reg-ns"));
        assert!(registry_of(&request, "jenkins").is_err());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::try_parse_from([
            "operandctl",
            "name",
            "--request",
            "req",
            "--api-version",
            "v1",
            "--kind",
            "Foo",
            "--immutable-kinds",
            "Job,CronJob",
            "--delete-timeout-secs",
            "5",
        ])
        .unwrap();
        let s = cli.tuning.settings();
        assert!(s.is_immutable("cronjob"));
        assert_eq!(s.delete_timeout, Duration::from_secs(5));
    }
}
