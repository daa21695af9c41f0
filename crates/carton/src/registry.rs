//! Registry client contract.
//!
//! Bundles are often unpacked straight into a container registry:
//! blobs pushed (or cross-repository mounted) by digest, then a
//! manifest published on top. The core stays transport-agnostic and
//! only defines the async interface a registry integration has to
//! satisfy; implementations live with the consumer.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::digest::Digest;

/// Boxed byte stream handed across the registry boundary.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Basic credentials for token negotiation.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// Bearer token scoped to one repository interaction.
#[derive(Debug, Clone)]
pub struct RegistryToken {
    pub token: String,
}

/// Content-addressed description of one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
}

/// A fetched manifest together with the token it was fetched under, so
/// follow-up blob requests can reuse it.
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub manifest: serde_json::Value,
    pub token: Option<RegistryToken>,
}

/// Failures crossing the registry boundary.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry rejected the provided credentials")]
    Unauthorized,

    #[error("{0} not found in registry")]
    NotFound(String),

    #[error("registry protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async registry surface the core depends on.
///
/// Methods mirror the distribution flow: resolve a manifest (acquiring
/// a token on the way), pull blobs by digest, push or mount blobs, and
/// finally publish a manifest referencing them.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve `reference` (e.g. `library/alpine:3.19`) to its manifest,
    /// negotiating a pull token when credentials are given.
    async fn fetch_manifest(
        &self,
        reference: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<FetchedManifest, RegistryError>;

    /// Open a blob for streaming download.
    async fn fetch_blob(
        &self,
        repository: &str,
        digest: &Digest,
        token: Option<&RegistryToken>,
    ) -> Result<ByteStream, RegistryError>;

    /// Upload one blob; the registry verifies it against the
    /// descriptor's digest and size.
    async fn push_blob(
        &self,
        repository: &str,
        descriptor: &BlobDescriptor,
        data: ByteStream,
        token: Option<&RegistryToken>,
    ) -> Result<(), RegistryError>;

    /// Cross-repository mount. Returns `true` when the registry
    /// already had the blob and linked it without an upload.
    async fn mount_blob(
        &self,
        repository: &str,
        from_repository: &str,
        digest: &Digest,
        token: Option<&RegistryToken>,
    ) -> Result<bool, RegistryError>;

    /// Publish a manifest under `reference` once its blobs exist.
    async fn publish_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        manifest: serde_json::Value,
        token: Option<&RegistryToken>,
    ) -> Result<(), RegistryError>;
}
