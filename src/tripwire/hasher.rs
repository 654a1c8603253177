//! BLAKE3 hashing of resource state.
//!
//! JSON objects are hashed in key order (serde_json's default map is sorted),
//! so two property trees that differ only in construction order hash alike.

use serde_json::Value;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Compute a composite hash from multiple component hashes.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Hash a JSON value by its canonical serialization.
pub fn hash_json(value: &Value) -> String {
    hash_string(&value.to_string())
}

/// Hash a resource: type, properties and explicit dependencies.
pub fn hash_resource(resource_type: &str, properties: &Value, depends_on: &[String]) -> String {
    let props = hash_json(properties);
    let deps = depends_on.join(",");
    composite_hash(&[resource_type, &props, &deps])
}
