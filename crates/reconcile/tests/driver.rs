mod common;

use std::sync::Arc;

use common::*;
use operand_core::labels::is_owned;
use operand_core::naming::derive_instance_name;
use operand_core::object::spec_of;
use operand_core::status::{ClusterPhase, OperatorPhase, ServicePhase};
use operand_core::{ObjectRef, Verb};
use operand_store::MemoryStore;
use serde_json::json;

fn backup_operand(index_name: Option<&str>) -> serde_json::Value {
    let mut operand = json!({
        "name": "etcd",
        "kind": "EtcdBackup",
        "apiVersion": ETCD_API,
        "spec": { "storageType": "S3" }
    });
    if let Some(name) = index_name {
        operand["instanceName"] = json!(name);
    }
    operand
}

#[tokio::test]
async fn config_tier_creates_merged_custom_resource() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    let obj = store.object(&cluster_ref()).expect("EtcdCluster created in operator namespace");
    assert_eq!(spec_of(&obj), json!({"size": 3, "version": "v1"}));
    assert!(is_owned(&obj.metadata));

    let member = req.status.member("etcd").unwrap();
    assert_eq!(member.phase.operator_phase, Some(OperatorPhase::Running));
    assert_eq!(member.phase.operand_phase, Some(ServicePhase::Running));
    assert!(member.operand_cr_list.is_empty());
    assert_eq!(req.status.phase, ClusterPhase::Running);
}

#[tokio::test]
async fn repeated_passes_are_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([{ "name": "etcd" }, backup_operand(None)]));

    r.reconcile(&mut req).await.unwrap();
    r.reconcile(&mut req).await.unwrap();

    assert_eq!(store.count(Verb::Create), 2);
    assert_eq!(store.count(Verb::Update), 0);
    assert_eq!(store.count(Verb::Delete), 0);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn stored_spec_outranks_template_but_not_config() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &cluster_ref(), true, json!({"size": 5, "version": "v0"}));
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    let obj = store.object(&cluster_ref()).unwrap();
    assert_eq!(spec_of(&obj), json!({"size": 3, "version": "v0"}));
    assert_eq!(obj.metadata.generation, Some(2));
}

#[tokio::test]
async fn unowned_custom_resource_is_left_alone() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &cluster_ref(), false, json!({"size": 1}));
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    assert_eq!(spec_of(&store.object(&cluster_ref()).unwrap()), json!({"size": 1}));
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn owned_object_of_unconfigured_kind_is_removed() {
    let store = Arc::new(MemoryStore::new());
    let backup_template = json!({
        "apiVersion": ETCD_API,
        "kind": "EtcdBackup",
        "metadata": { "name": "backup-example" },
        "spec": {}
    });
    let backup = ObjectRef::new(ETCD_API, "EtcdBackup", Some("ns1"), "backup-example");
    seed(&store, &backup, true, json!({}));
    let r = reconciler(&store, catalog("Succeeded", json!([etcd_template(), backup_template]), etcd_service()));
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    assert!(!store.contains(&backup));
    assert!(store.contains(&cluster_ref()));
}

#[tokio::test]
async fn request_tier_uses_derived_name_and_records_status() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([backup_operand(None), backup_operand(Some("nightly"))]));

    r.reconcile(&mut req).await.unwrap();

    let derived = derive_instance_name("req", ETCD_API, "EtcdBackup", 0);
    let first = ObjectRef::new(ETCD_API, "EtcdBackup", Some(REQ_NS), &derived);
    let second = ObjectRef::new(ETCD_API, "EtcdBackup", Some(REQ_NS), "nightly");
    let obj = store.object(&first).expect("derived name");
    assert_eq!(spec_of(&obj), json!({"storageType": "S3"}));
    assert!(store.contains(&second));

    let names: Vec<_> = req.status.member("etcd").unwrap().operand_cr_list.iter().map(|c| c.name.clone()).collect();
    assert_eq!(names, vec![derived, "nightly".to_string()]);
}

#[tokio::test]
async fn request_tier_requires_api_version() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([{ "name": "etcd", "kind": "EtcdBackup" }]));

    let errs = r.reconcile(&mut req).await.unwrap_err();

    assert_eq!(errs.len(), 1);
    assert!(errs.to_string().contains("the apiVersion of custom resource is empty for operator etcd"), "{}", errs);
    let member = req.status.member("etcd").unwrap();
    assert_eq!(member.phase.operand_phase, Some(ServicePhase::Failed));
    assert_eq!(req.status.phase, ClusterPhase::Failed);
    assert!(store.is_empty());
}

#[tokio::test]
async fn dropped_operand_resources_are_cleaned_up() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([backup_operand(None)]));
    r.reconcile(&mut req).await.unwrap();
    assert_eq!(req.status.recorded_crs().len(), 1);

    req = operand_core::model::OperandRequest { status: req.status, ..request(json!([{ "name": "etcd" }])) };
    r.reconcile(&mut req).await.unwrap();

    assert!(req.status.recorded_crs().is_empty());
    assert_eq!(store.count(Verb::Delete), 1);
    assert!(store.contains(&cluster_ref()));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn stuck_orphan_does_not_block_other_operands() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([backup_operand(Some("a")), backup_operand(Some("b")), backup_operand(Some("c"))]));
    r.reconcile(&mut req).await.unwrap();
    store.fail_on(Verb::Delete, "b");

    req = operand_core::model::OperandRequest { status: req.status, ..request(json!([{ "name": "etcd" }])) };
    let errs = r.reconcile(&mut req).await.unwrap_err();

    assert_eq!(errs.len(), 1);
    assert!(errs.to_string().contains("EtcdBackup ibm-common-services/b"), "{}", errs);
    let left: Vec<_> = req.status.recorded_crs().into_iter().map(|(_, cr)| cr.name).collect();
    assert_eq!(left, vec!["b".to_string()]);
    assert_eq!(store.count(Verb::Delete), 2);
    assert!(store.contains(&cluster_ref()));
    assert_eq!(req.status.member("etcd").unwrap().phase.operand_phase, Some(ServicePhase::Running));

    store.clear_failures();
    r.reconcile(&mut req).await.unwrap();
    assert!(req.status.recorded_crs().is_empty());
}

#[tokio::test]
async fn request_tier_follows_changed_spec() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([backup_operand(Some("nightly"))]));
    r.reconcile(&mut req).await.unwrap();

    let mut changed = backup_operand(Some("nightly"));
    changed["spec"] = json!({ "storageType": "PV", "retain": 3 });
    req = operand_core::model::OperandRequest { status: req.status, ..request(json!([changed])) };
    r.reconcile(&mut req).await.unwrap();

    let target = ObjectRef::new(ETCD_API, "EtcdBackup", Some(REQ_NS), "nightly");
    let obj = store.object(&target).unwrap();
    assert_eq!(spec_of(&obj), json!({"storageType": "PV", "retain": 3}));
    assert_eq!(obj.metadata.generation, Some(2));
    assert_eq!(store.count(Verb::Update), 1);
    assert_eq!(req.status.member("etcd").unwrap().operand_cr_list.len(), 1);
}

#[tokio::test]
async fn request_tier_leaves_unowned_object_alone() {
    let store = Arc::new(MemoryStore::new());
    let derived = derive_instance_name("req", ETCD_API, "EtcdBackup", 0);
    let target = ObjectRef::new(ETCD_API, "EtcdBackup", Some(REQ_NS), &derived);
    seed(&store, &target, false, json!({"storageType": "Local"}));
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([backup_operand(None)]));

    r.reconcile(&mut req).await.unwrap();

    assert_eq!(spec_of(&store.object(&target).unwrap()), json!({"storageType": "Local"}));
    assert!(store.journal().is_empty());
    assert!(req.status.recorded_crs().is_empty());
    assert_eq!(req.status.member("etcd").unwrap().phase.operand_phase, Some(ServicePhase::Running));
}

#[tokio::test]
async fn installing_operator_is_reported_and_skipped() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, catalog("Installing", json!([etcd_template()]), etcd_service()));
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    assert_eq!(req.status.member("etcd").unwrap().phase.operator_phase, Some(OperatorPhase::Installing));
    assert_eq!(req.status.phase, ClusterPhase::Installing);
    assert!(store.is_empty());
}

#[tokio::test]
async fn failed_installation_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, catalog("Failed", json!([etcd_template()]), etcd_service()));
    let mut req = request(json!([{ "name": "etcd" }]));

    let errs = r.reconcile(&mut req).await.unwrap_err();

    assert!(errs.to_string().contains("installation of operator etcd in namespace ns1 failed"), "{}", errs);
    assert_eq!(req.status.member("etcd").unwrap().phase.operator_phase, Some(OperatorPhase::Failed));
    assert_eq!(req.status.phase, ClusterPhase::Failed);
    assert!(store.is_empty());
}

#[tokio::test]
async fn unknown_installation_state_marks_operator_failed_without_error() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, catalog("Unknown", json!([etcd_template()]), etcd_service()));
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    assert_eq!(req.status.member("etcd").unwrap().phase.operator_phase, Some(OperatorPhase::Failed));
    assert!(store.is_empty());
}

#[tokio::test]
async fn missing_registry_does_not_stop_other_entries() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req: operand_core::model::OperandRequest = serde_json::from_value(json!({
        "name": "req",
        "namespace": REQ_NS,
        "spec": { "requests": [
            { "registry": "missing", "operands": [{ "name": "etcd" }] },
            { "registry": "common-service", "operands": [{ "name": "etcd" }, { "name": "unlisted" }] }
        ]}
    }))
    .unwrap();

    let errs = r.reconcile(&mut req).await.unwrap_err();

    assert_eq!(errs.len(), 1);
    assert!(errs.to_string().contains("registry ibm-common-services/missing not found"), "{}", errs);
    assert!(store.contains(&cluster_ref()));
    assert!(req.status.member("unlisted").is_none());
}

#[tokio::test]
async fn malformed_templates_fail_the_service() {
    let store = Arc::new(MemoryStore::new());
    let mut cat = default_catalog();
    cat.installs[0].status.templates = Some("[{".to_string());
    let r = reconciler(&store, cat);
    let mut req = request(json!([{ "name": "etcd" }]));

    let errs = r.reconcile(&mut req).await.unwrap_err();

    assert!(errs.to_string().contains("template examples of operator etcd"), "{}", errs);
    assert_eq!(req.status.member("etcd").unwrap().phase.operand_phase, Some(ServicePhase::Failed));
}

#[tokio::test]
async fn absent_templates_create_nothing() {
    let store = Arc::new(MemoryStore::new());
    let mut cat = default_catalog();
    cat.installs[0].status.templates = None;
    let r = reconciler(&store, cat);
    let mut req = request(json!([{ "name": "etcd" }]));

    r.reconcile(&mut req).await.unwrap();

    assert!(store.is_empty());
    assert_eq!(req.status.member("etcd").unwrap().phase.operand_phase, Some(ServicePhase::Running));
}

#[tokio::test]
async fn request_spec_overrides_config_tier_layers() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(&store, default_catalog());
    let mut req = request(json!([{ "name": "etcd", "spec": { "version": "v2" } }]));

    r.reconcile(&mut req).await.unwrap();
    assert_eq!(spec_of(&store.object(&cluster_ref()).unwrap()), json!({"size": 3, "version": "v2"}));

    req = operand_core::model::OperandRequest { status: req.status, ..request(json!([{ "name": "etcd", "spec": { "size": 5 } }])) };
    r.reconcile(&mut req).await.unwrap();
    assert_eq!(spec_of(&store.object(&cluster_ref()).unwrap()), json!({"size": 5, "version": "v2"}));
}
