//! # Fingerprints
//!
//! SHA-256 over a canonical encoding of JSON values.
//!
//! Object keys are visited in sorted order and every node is tagged and
//! length-prefixed, so the fingerprint depends only on logical content and
//! never on map insertion order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Fingerprint any serializable value
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(fingerprint_value(&serde_json::to_value(value)?))
}

/// Fingerprint a JSON value, returned as lowercase hex
#[must_use]
pub fn fingerprint_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    write_canonical(value, &mut hasher);
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(true) => hasher.update(b"t"),
        Value::Bool(false) => hasher.update(b"f"),
        Value::Number(number) => {
            hasher.update(b"d");
            write_str(&number.to_string(), hasher);
        }
        Value::String(s) => {
            hasher.update(b"s");
            write_str(s, hasher);
        }
        Value::Array(items) => {
            hasher.update(b"a");
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                write_canonical(item, hasher);
            }
        }
        Value::Object(map) => {
            hasher.update(b"o");
            hasher.update((map.len() as u64).to_be_bytes());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                write_str(key, hasher);
                write_canonical(&map[key.as_str()], hasher);
            }
        }
    }
}

fn write_str(s: &str, hasher: &mut Sha256) {
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}
