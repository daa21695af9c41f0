//! Bundle reader.
//!
//! A [`ReadableBundle`] moves through three phases: before the manifest
//! (nothing verified yet), resources available (manifest pulled,
//! hash-checked, signature-checked, decoded and cached), and drained
//! (the single-pass resource enumeration handed out and exhausted).
//!
//! The two header entries are pulled in fixed order; everything after
//! them is delivered through the iterator's hand-off mode as a lazy,
//! forward-only sequence of digest-verified resource streams.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;

use crate::contents::{
    self, ContentsDocument, ResourceDescriptor, SignatureEnvelope, CONTENTS_JSON, CONTENTS_SIG,
    RESOURCES_DIR,
};
use crate::digest::sha256_hex;
use crate::entries::{ArchiveEntry, EntryData, EntryIterator, EntryStream};
use crate::error::{BundleError, ContentsError, SignatureError};
use crate::hasher::Hasher;
use crate::signer;

/// Streaming bundle reader over any `AsyncRead` source.
pub struct ReadableBundle<T> {
    iterator: Option<EntryIterator>,
    contents: Option<ContentsDocument<T>>,
    bundle_type: String,
    public_key_pem: Option<String>,
}

impl<T: DeserializeOwned> ReadableBundle<T> {
    /// Open a bundle for reading.
    ///
    /// `bundle_type` is the type the caller expects the document to
    /// declare. Supply the public key iff the bundle is expected to be
    /// signed; a mismatch in either direction fails `manifest()`.
    pub fn new<R>(reader: R, bundle_type: impl Into<String>, public_key_pem: Option<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            iterator: Some(EntryIterator::new(reader)),
            contents: None,
            bundle_type: bundle_type.into(),
            public_key_pem,
        }
    }

    /// Pull, verify and cache the contents document; return the
    /// manifest payload. Idempotent: later calls return the cache.
    pub async fn manifest(&mut self) -> Result<&T, BundleError> {
        let document = match self.contents.take() {
            Some(document) => document,
            None => self.read_contents().await?,
        };
        Ok(&self.contents.insert(document).manifest)
    }

    /// The verified resource descriptors, available once `manifest()`
    /// has succeeded.
    pub fn descriptors(&self) -> Option<&[ResourceDescriptor]> {
        self.contents.as_ref().map(|c| c.resources.as_slice())
    }

    /// Switch to hand-off mode and enumerate the resource entries as a
    /// lazy, forward-only, single-pass sequence.
    pub fn resources(&mut self) -> Result<ResourceStream, BundleError> {
        if self.contents.is_none() {
            return Err(BundleError::ManifestNotRead);
        }
        let iterator = self.iterator.take().ok_or(BundleError::AlreadyConsumed)?;
        let descriptors = self
            .contents
            .as_ref()
            .map(|c| c.resources.clone())
            .unwrap_or_default();
        Ok(ResourceStream {
            entries: iterator.handoff(),
            descriptors,
        })
    }

    async fn read_contents(&mut self) -> Result<ContentsDocument<T>, BundleError> {
        let iterator = self.iterator.as_mut().ok_or(BundleError::AlreadyConsumed)?;

        let contents_bytes = Self::pull_named(iterator, CONTENTS_JSON).await?;
        let envelope_bytes = Self::pull_named(iterator, CONTENTS_SIG).await?;

        let envelope: SignatureEnvelope = serde_json::from_slice(&envelope_bytes)
            .map_err(|e| SignatureError::MalformedEnvelope(e.to_string()))?;

        // Integrity first, independent of signing.
        if sha256_hex(&contents_bytes) != envelope.digest {
            return Err(BundleError::ContentsCorrupted);
        }

        match (&envelope.signature, &self.public_key_pem) {
            (Some(signature), Some(key)) => {
                if !signer::verify(key, signature, &contents_bytes)? {
                    return Err(SignatureError::Invalid.into());
                }
            }
            (Some(_), None) => return Err(SignatureError::MissingKey.into()),
            (None, Some(_)) => return Err(SignatureError::UnexpectedSignature.into()),
            (None, None) => {}
        }

        let document: ContentsDocument<T> = contents::decode(&contents_bytes)?;
        if document.bundle_type != self.bundle_type {
            return Err(ContentsError::TypeMismatch {
                expected: self.bundle_type.clone(),
                found: document.bundle_type,
            }
            .into());
        }

        tracing::debug!(
            resources = document.resources.len(),
            signed = envelope.signature.is_some(),
            "manifest verified"
        );
        Ok(document)
    }

    /// Pull one entry and require its name; header entries are small and
    /// read fully into memory.
    async fn pull_named(iterator: &mut EntryIterator, name: &str) -> Result<Vec<u8>, BundleError> {
        let entry = match iterator.next_entry().await {
            Some(Ok(entry)) => entry,
            Some(Err(err)) => return Err(err),
            None => {
                return Err(BundleError::Archive(format!(
                    "archive ended before {name}"
                )))
            }
        };
        if entry.name != name {
            return Err(BundleError::UnexpectedEntry {
                expected: name.to_string(),
                found: entry.name,
            });
        }
        entry.data.read_to_vec().await
    }
}

/// The lazy resource enumeration. Items arrive in physical storage
/// order; each must be drained before the next becomes available.
pub struct ResourceStream {
    entries: EntryStream,
    descriptors: Vec<ResourceDescriptor>,
}

impl ResourceStream {
    /// Await the next resource, or `None` once the archive is drained.
    pub async fn next(&mut self) -> Option<Result<VerifiedResource, BundleError>> {
        let entry = match self.entries.next_entry().await? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        Some(self.resolve(entry))
    }

    fn resolve(&self, entry: ArchiveEntry) -> Result<VerifiedResource, BundleError> {
        let key = match entry.name.strip_prefix(&format!("{RESOURCES_DIR}/")) {
            Some(key) => key.to_string(),
            None => {
                return Err(BundleError::UnexpectedEntry {
                    expected: format!("{RESOURCES_DIR}/*"),
                    found: entry.name,
                })
            }
        };

        let descriptors: Vec<ResourceDescriptor> = self
            .descriptors
            .iter()
            .filter(|descriptor| descriptor.digest.hex() == key)
            .cloned()
            .collect();
        let Some(first) = descriptors.first() else {
            return Err(BundleError::UnknownResource(entry.name));
        };

        tracing::debug!(id = %first.id, matches = descriptors.len(), "resource entry");
        let data = ResourceData {
            inner: Hasher::new(entry.data, first.digest.clone()),
        };
        Ok(VerifiedResource { descriptors, data })
    }
}

impl Stream for ResourceStream {
    type Item = Result<VerifiedResource, BundleError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match futures::ready!(Pin::new(&mut this.entries).poll_next(cx)) {
            Some(Ok(entry)) => Poll::Ready(Some(this.resolve(entry))),
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }
}

/// One stored payload and every descriptor that maps to it.
#[derive(Debug)]
pub struct VerifiedResource {
    /// All descriptors sharing this payload's digest.
    pub descriptors: Vec<ResourceDescriptor>,
    /// The digest-verified byte stream.
    pub data: ResourceData,
}

/// Digest-verified byte stream of one resource.
///
/// Bytes are provisional until the stream ends cleanly; a corrupt
/// payload terminates with [`BundleError::Digest`] after its last chunk.
#[derive(Debug)]
pub struct ResourceData {
    inner: Hasher<EntryData>,
}

impl ResourceData {
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, BundleError>> {
        self.inner.next().await
    }

    /// Drain the stream into memory, failing on any integrity error.
    pub async fn read_to_vec(mut self) -> Result<Vec<u8>, BundleError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl Stream for ResourceData {
    type Item = Result<Bytes, BundleError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
