//! Raw bundle assembly.
//!
//! The high-level writer validates everything it emits, so tests that
//! need a corrupt digest, a misplaced entry, or a stale envelope build
//! the tar stream directly with [`RawBundleBuilder`].

use carton::contents::{
    ContentsDocument, ResourceDescriptor, SignatureEnvelope, BUNDLE_VERSION, CONTENTS_JSON,
    CONTENTS_SIG, RESOURCES_DIR,
};
use carton::digest::{Digest, DigestAlgorithm};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeSet;

/// A descriptor for an in-memory payload, digest and size filled in.
pub fn descriptor(id: &str, data: &[u8]) -> ResourceDescriptor {
    ResourceDescriptor {
        id: id.to_string(),
        aliases: BTreeSet::new(),
        size: data.len() as u64,
        digest: Digest::compute(DigestAlgorithm::Sha256, data),
        resource_type: None,
        metadata: None,
    }
}

/// Like [`descriptor`], with aliases attached.
pub fn descriptor_with_aliases(id: &str, aliases: &[&str], data: &[u8]) -> ResourceDescriptor {
    let mut descriptor = descriptor(id, data);
    descriptor.aliases = aliases.iter().map(|a| a.to_string()).collect();
    descriptor
}

/// Serialized `contents.json` bytes for the given parts.
pub fn contents_json(
    bundle_type: &str,
    manifest: serde_json::Value,
    resources: Vec<ResourceDescriptor>,
) -> Vec<u8> {
    let document = ContentsDocument {
        version: BUNDLE_VERSION.to_string(),
        bundle_type: bundle_type.to_string(),
        manifest,
        resources,
    };
    carton::contents::encode(&document).expect("test document encodes")
}

/// Serialized `contents.sig` bytes: SHA-256 of `contents` plus an
/// optional precomputed signature.
pub fn envelope_json(contents: &[u8], signature: Option<String>) -> Vec<u8> {
    let envelope = SignatureEnvelope {
        digest: hex::encode(Sha256::digest(contents)),
        signature,
    };
    let mut json = serde_json::to_vec_pretty(&envelope).expect("envelope encodes");
    json.push(b'\n');
    json
}

/// Builds a tar stream entry by entry, with no validation whatsoever.
pub struct RawBundleBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl RawBundleBuilder {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Append one regular-file entry.
    pub fn entry(mut self, name: &str, data: &[u8]) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder
            .append_data(&mut header, name, data)
            .expect("in-memory tar append");
        self
    }

    /// Finish the archive and return its bytes.
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().expect("in-memory tar finish")
    }
}

impl Default for RawBundleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A structurally valid bundle assembled from raw parts: header
/// entries plus one payload per resource, stored under its digest.
/// Payloads are taken verbatim, so passing bytes that do not match a
/// descriptor produces a bundle that only fails at read time.
pub fn handmade_bundle(
    bundle_type: &str,
    manifest: serde_json::Value,
    resources: &[(ResourceDescriptor, &[u8])],
) -> Vec<u8> {
    let descriptors: Vec<ResourceDescriptor> =
        resources.iter().map(|(d, _)| d.clone()).collect();
    let contents = contents_json(bundle_type, manifest, descriptors);
    let envelope = envelope_json(&contents, None);

    let mut builder = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope);
    let mut written = BTreeSet::new();
    for (descriptor, payload) in resources {
        if written.insert(descriptor.digest.hex().to_string()) {
            builder = builder.entry(
                &format!("{}/{}", RESOURCES_DIR, descriptor.digest.hex()),
                payload,
            );
        }
    }
    builder.build()
}
