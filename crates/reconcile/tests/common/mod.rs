#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use operand_core::labels::owned_marker;
use operand_core::model::OperandRequest;
use operand_core::object::set_spec;
use operand_core::ObjectRef;
use operand_reconcile::{Reconciler, Settings, StaticCatalog};
use operand_store::MemoryStore;
use serde_json::{json, Value as Json};

pub const REQ_NS: &str = "ibm-common-services";
pub const ETCD_API: &str = "etcd.database.coreos.com/v1beta2";

pub fn fast_settings() -> Settings {
    Settings {
        update_poll: Duration::from_millis(10),
        update_timeout: Duration::from_millis(500),
        delete_poll: Duration::from_millis(10),
        delete_timeout: Duration::from_millis(500),
        ..Settings::default()
    }
}

pub fn etcd_template() -> Json {
    json!({
        "apiVersion": ETCD_API,
        "kind": "EtcdCluster",
        "metadata": { "name": "example" },
        "spec": { "size": 1, "version": "v1" }
    })
}

pub fn cluster_ref() -> ObjectRef {
    ObjectRef::new(ETCD_API, "EtcdCluster", Some("ns1"), "example")
}

/// One registry with the `etcd` operator installed in `ns1`, its default
/// configuration and its install record.
pub fn catalog(phase: &str, templates: Json, service: Json) -> StaticCatalog {
    serde_json::from_value(json!({
        "registries": [{
            "name": "common-service",
            "namespace": REQ_NS,
            "operators": [{
                "name": "etcd",
                "namespace": "ns1",
                "packageName": "etcd",
                "installMode": "namespace"
            }]
        }],
        "configs": [{
            "name": "common-service",
            "namespace": REQ_NS,
            "services": [service]
        }],
        "installs": [{
            "operator": "etcd",
            "namespace": "ns1",
            "status": { "phase": phase, "templates": templates.to_string() }
        }]
    }))
    .unwrap()
}

pub fn etcd_service() -> Json {
    json!({ "name": "etcd", "spec": { "EtcdCluster": { "size": 3 } } })
}

pub fn default_catalog() -> StaticCatalog {
    catalog("Succeeded", json!([etcd_template()]), etcd_service())
}

pub fn request(operands: Json) -> OperandRequest {
    serde_json::from_value(json!({
        "name": "req",
        "namespace": REQ_NS,
        "spec": { "requests": [{ "registry": "common-service", "operands": operands }] }
    }))
    .unwrap()
}

pub fn reconciler(store: &Arc<MemoryStore>, catalog: StaticCatalog) -> Reconciler {
    Reconciler::with_catalog(store.clone(), fast_settings(), Arc::new(catalog))
}

pub fn seed(store: &MemoryStore, target: &ObjectRef, owned: bool, spec: Json) {
    let mut obj = target.to_bare();
    if owned {
        obj.metadata.labels = Some(owned_marker());
    }
    set_spec(&mut obj, spec);
    store.insert(obj);
}
