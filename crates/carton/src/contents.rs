//! The contents document and its canonical codec.
//!
//! `contents.json` is the first entry of every bundle: a version gate,
//! the bundle type, an opaque caller-defined manifest, and the ordered
//! list of resource descriptors. Its canonical byte form is the input to
//! both the integrity hash in `contents.sig` and the optional detached
//! signature, so encoding must be deterministic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::digest::Digest;
use crate::error::ContentsError;

/// The single supported bundle format version.
pub const BUNDLE_VERSION: &str = "1";

/// Archive entry name of the contents document.
pub const CONTENTS_JSON: &str = "contents.json";

/// Archive entry name of the signature envelope.
pub const CONTENTS_SIG: &str = "contents.sig";

/// Directory prefix for resource entries.
pub const RESOURCES_DIR: &str = "resources";

/// Metadata for one resource, independent of its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,

    /// Alternative ids referring to the same resource.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,

    /// Exact length of the stored payload in bytes.
    pub size: u64,

    /// Content digest, doubling as the storage address.
    pub digest: Digest,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ResourceDescriptor {
    /// The entry name this resource is stored under.
    ///
    /// Derived from the digest, so descriptors sharing a digest share
    /// one physical entry.
    pub fn storage_path(&self) -> String {
        format!("{}/{}", RESOURCES_DIR, self.digest.hex())
    }
}

/// The manifest-plus-descriptors document stored as `contents.json`.
///
/// `T` is the caller-supplied manifest payload type; the core never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsDocument<T> {
    pub version: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub manifest: T,
    pub resources: Vec<ResourceDescriptor>,
}

/// The `contents.sig` envelope: integrity hash of the canonical contents
/// bytes, plus the detached signature when the bundle is signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    /// SHA-256 hex of the canonical `contents.json` bytes.
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Serialize a value to the bundle's canonical byte form: pretty JSON
/// with a trailing newline.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ContentsError> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| ContentsError::Malformed(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Encode a contents document to canonical bytes.
///
/// Rejects documents with duplicate ids or aliases before serializing,
/// so a malformed document can never be committed to the wire.
pub fn encode<T: Serialize>(document: &ContentsDocument<T>) -> Result<Vec<u8>, ContentsError> {
    check_unique_ids(&document.resources)?;
    to_canonical_json(document)
}

/// Decode and validate a contents document.
///
/// Validation order: JSON shape, required top-level keys, version gate,
/// per-descriptor required keys, digest parse, id/alias uniqueness. Each
/// violation raises its own [`ContentsError`] variant.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<ContentsDocument<T>, ContentsError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ContentsError::Malformed(e.to_string()))?;
    let object = value.as_object().ok_or(ContentsError::NotAnObject)?;

    for field in ["version", "type", "manifest", "resources"] {
        if !object.contains_key(field) {
            return Err(ContentsError::MissingField(field));
        }
    }

    let version = object
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if version != BUNDLE_VERSION {
        return Err(ContentsError::UnsupportedVersion {
            expected: BUNDLE_VERSION,
            found: version.to_string(),
        });
    }

    let resources = object
        .get("resources")
        .and_then(|v| v.as_array())
        .ok_or(ContentsError::MissingField("resources"))?;
    for (index, resource) in resources.iter().enumerate() {
        let Some(resource) = resource.as_object() else {
            return Err(ContentsError::MissingResourceField { index, field: "id" });
        };
        for field in ["id", "size", "digest"] {
            if !resource.contains_key(field) {
                return Err(ContentsError::MissingResourceField { index, field });
            }
        }
        if let Some(digest) = resource.get("digest").and_then(|v| v.as_str()) {
            digest.parse::<Digest>()?;
        }
    }

    let document: ContentsDocument<T> =
        serde_json::from_value(value).map_err(|e| ContentsError::Malformed(e.to_string()))?;
    check_unique_ids(&document.resources)?;
    Ok(document)
}

/// Reject descriptor lists where any id or alias appears twice.
pub fn check_unique_ids(resources: &[ResourceDescriptor]) -> Result<(), ContentsError> {
    let mut seen = HashSet::new();
    for descriptor in resources {
        if !seen.insert(descriptor.id.as_str()) {
            return Err(ContentsError::DuplicateResourceId(descriptor.id.clone()));
        }
        for alias in &descriptor.aliases {
            if !seen.insert(alias.as_str()) {
                return Err(ContentsError::DuplicateResourceId(alias.clone()));
            }
        }
    }
    Ok(())
}
