//! Ownership and retention markers.
//!
//! Every mutation the reconciler performs is gated on [`OWNED_LABEL`]; an
//! object without it belongs to someone else and is only ever read.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Marks objects created and managed by the reconciler.
pub const OWNED_LABEL: &str = "operand.lifecycle.io/managed";

/// Set by users to keep an owned object when it is no longer requested.
pub const RETAIN_LABEL: &str = "operand.lifecycle.io/do-not-uninstall";

/// Content hash of the desired payload on objects that are replaced rather
/// than updated in place.
pub const HASH_ANNOTATION: &str = "operand.lifecycle.io/hashed-data";

pub const TRUE: &str = "true";

pub fn owned_marker() -> BTreeMap<String, String> {
    BTreeMap::from([(OWNED_LABEL.to_string(), TRUE.to_string())])
}

/// Set every given label, keeping labels that are not mentioned.
pub fn ensure_labels(meta: &mut ObjectMeta, labels: &BTreeMap<String, String>) {
    if labels.is_empty() {
        return;
    }
    let existing = meta.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in labels {
        existing.insert(k.clone(), v.clone());
    }
}

pub fn ensure_annotations(meta: &mut ObjectMeta, annotations: &BTreeMap<String, String>) {
    if annotations.is_empty() {
        return;
    }
    let existing = meta.annotations.get_or_insert_with(BTreeMap::new);
    for (k, v) in annotations {
        existing.insert(k.clone(), v.clone());
    }
}

/// True only when every key is present with exactly the given value.
pub fn check_labels(meta: &ObjectMeta, labels: &BTreeMap<String, String>) -> bool {
    let Some(existing) = meta.labels.as_ref() else {
        return labels.is_empty();
    };
    labels.iter().all(|(k, v)| existing.get(k) == Some(v))
}

fn has_true_label(meta: &ObjectMeta, key: &str) -> bool {
    meta.labels.as_ref().and_then(|l| l.get(key)).map(|v| v == TRUE).unwrap_or(false)
}

pub fn is_owned(meta: &ObjectMeta) -> bool {
    has_true_label(meta, OWNED_LABEL)
}

pub fn is_retained(meta: &ObjectMeta) -> bool {
    has_true_label(meta, RETAIN_LABEL)
}

pub fn stamp_owned(meta: &mut ObjectMeta) {
    ensure_labels(meta, &owned_marker());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with(labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn ensure_keeps_unrelated_labels() {
        let mut meta = meta_with(&[("app", "etcd")]);
        stamp_owned(&mut meta);
        let labels = meta.labels.unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("etcd"));
        assert_eq!(labels.get(OWNED_LABEL).map(String::as_str), Some("true"));
    }

    #[test]
    fn check_requires_exact_value() {
        let meta = meta_with(&[(OWNED_LABEL, "false")]);
        assert!(!is_owned(&meta));
        assert!(!check_labels(&meta, &owned_marker()));

        let meta = meta_with(&[(OWNED_LABEL, "true"), (RETAIN_LABEL, "true")]);
        assert!(is_owned(&meta));
        assert!(is_retained(&meta));
    }

    #[test]
    fn check_on_unlabelled_object() {
        let meta = ObjectMeta::default();
        assert!(!is_owned(&meta));
        assert!(check_labels(&meta, &BTreeMap::new()));
    }
}
