//! Deterministic names and content hashes.

use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Bytes of the sha256 digest kept in derived names and hashes.
const DIGEST_PREFIX: usize = 7;

fn short_digest(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    hex::encode(&digest[..DIGEST_PREFIX])
}

/// Name of a request-tier object when the operand gives none:
/// `<request>-<hex(sha256(apiVersion + kind + index))[..7 bytes]>`.
///
/// Must stay stable across releases, otherwise the next pass no longer finds
/// the objects created by the previous one.
pub fn derive_instance_name(request_name: &str, api_version: &str, kind: &str, index: usize) -> String {
    let seed = format!("{}{}{}", api_version, kind, index);
    format!("{}-{}", request_name, short_digest(seed.as_bytes()))
}

/// Hash of a desired payload, recorded on objects that are replaced instead
/// of patched. No payload hashes to the empty string.
pub fn content_hash(payload: Option<&Json>) -> String {
    match payload {
        Some(Json::Null) | None => String::new(),
        Some(p) => short_digest(p.to_string().as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_name_is_stable() {
        let a = derive_instance_name("common-service", "operator.example.io/v1", "Foo", 0);
        let b = derive_instance_name("common-service", "operator.example.io/v1", "Foo", 0);
        assert_eq!(a, b);
        assert!(a.starts_with("common-service-"));
        assert_eq!(a.len(), "common-service-".len() + 14);
    }

    #[test]
    fn derived_name_depends_on_index_and_kind() {
        let base = derive_instance_name("req", "v1", "Foo", 0);
        assert_ne!(base, derive_instance_name("req", "v1", "Foo", 1));
        assert_ne!(base, derive_instance_name("req", "v1", "Bar", 0));
    }

    #[test]
    fn derived_name_matches_known_digest() {
        // sha256("v1Foo0")
        let expected = &hex::encode(Sha256::digest(b"v1Foo0"))[..14];
        assert_eq!(derive_instance_name("req", "v1", "Foo", 0), format!("req-{}", expected));
    }

    #[test]
    fn content_hash_tracks_payload() {
        let a = json!({"spec": {"template": {"image": "a"}}});
        let b = json!({"spec": {"template": {"image": "b"}}});
        assert_eq!(content_hash(Some(&a)), content_hash(Some(&a.clone())));
        assert_ne!(content_hash(Some(&a)), content_hash(Some(&b)));
        assert_eq!(content_hash(None), "");
        assert_eq!(content_hash(Some(&a)).len(), 14);
    }
}
