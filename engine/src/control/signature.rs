//! Call signatures and fingerprints
//!
//! A *signature* identifies "the same call": tool name plus canonical
//! arguments. A *fingerprint* additionally folds in the set of artifacts
//! produced so far in the turn, so an identical call made after new files
//! appeared is not served from cache.
//!
//! Arguments are canonicalized before hashing (object keys sorted
//! recursively), so `{"a":1,"b":2}` and `{"b":2,"a":1}` share an identity.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Width of a signature in hex characters.
const SIGNATURE_LEN: usize = 16;

/// Width of a fingerprint in hex characters.
const FINGERPRINT_LEN: usize = 32;

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn digest_hex(parts: &[&str], width: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // unit separator keeps ("ab","c") distinct from ("a","bc")
        hasher.update([0x1f]);
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(width);
    hex
}

/// Stable short identifier for `(tool, args)`.
pub fn signature(tool: &str, args: &Value) -> String {
    digest_hex(&[tool, &canonical_json(args)], SIGNATURE_LEN)
}

/// Hash of an artifact set. Order-insensitive; duplicates collapse.
pub fn artifact_hash<S: AsRef<str>>(artifacts: &[S]) -> String {
    let mut ids: Vec<&str> = artifacts.iter().map(AsRef::as_ref).collect();
    ids.sort_unstable();
    ids.dedup();
    digest_hex(&[&ids.join("\n")], SIGNATURE_LEN)
}

/// Identity of `(tool, args)` under the current artifact state.
pub fn fingerprint<S: AsRef<str>>(tool: &str, args: &Value, artifacts: &[S]) -> String {
    digest_hex(
        &[tool, &canonical_json(args), &artifact_hash(artifacts)],
        FINGERPRINT_LEN,
    )
}

/// Hash of a tool result, kept by the guard per signature.
pub fn result_hash(result: &Value) -> String {
    digest_hex(&[&canonical_json(result)], SIGNATURE_LEN)
}
