//! Kubernetes naming and resource helpers shared by the compilers

use std::collections::BTreeMap;
use std::fmt::Write;

use aws_lc_rs::digest;
use serde::{Deserialize, Serialize};

use crate::{LABEL_APP_NAME, LABEL_MANAGED_BY, LABEL_MANAGED_BY_KEEL};

/// Number of hex characters appended when a name has to be shortened
pub const NAME_HASH_LEN: usize = 8;

/// Trait for types that have a known API version and kind.
///
/// Compiled resources carry these constants so serialization and any later
/// API call agree on the same apiVersion.
pub trait HasApiResource {
    /// Full apiVersion (e.g. "cert-manager.io/v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g. "Certificate")
    const KIND: &'static str;
}

/// Metadata for compiled resources
///
/// Adds Keel management labels on construction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create metadata labelled as managed by Keel for the given App
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, app: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_KEEL.to_string(),
        );
        labels.insert(LABEL_APP_NAME.to_string(), app.to_string());
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels,
        }
    }
}

/// Compute a deterministic hash of the input string as lowercase hex.
///
/// Uses truncated SHA-256 so the value is stable across toolchains and
/// processes. `len` is clamped to the digest size.
pub fn deterministic_hash(input: &str, len: usize) -> String {
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    let bytes = len.div_ceil(2).min(hash.as_ref().len());
    let mut out = hash.as_ref()[..bytes]
        .iter()
        .fold(String::with_capacity(bytes * 2), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        });
    out.truncate(len);
    out
}

/// Bound a name to `max_len` characters.
///
/// Names that already fit are returned unchanged. Longer names are cut and
/// suffixed with `-` plus a hash of the full name, so distinct long names
/// stay distinct and the same input always maps to the same output. Limits
/// too small for the suffix yield a hash cut to `max_len`.
pub fn bounded_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    if max_len <= NAME_HASH_LEN + 1 {
        return deterministic_hash(name, max_len);
    }
    let hash = deterministic_hash(name, NAME_HASH_LEN);
    let keep = max_len.saturating_sub(NAME_HASH_LEN + 1);
    // names are ASCII after sanitization; fall back to a char boundary otherwise
    let mut cut = keep.min(name.len());
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    let prefix = name[..cut].trim_end_matches('-');
    if prefix.is_empty() {
        hash
    } else {
        format!("{}-{}", prefix, hash)
    }
}
