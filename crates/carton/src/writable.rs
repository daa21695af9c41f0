//! Bundle writer.
//!
//! A [`WritableBundle`] is constructed with the complete descriptor list
//! up front: the contents document and its signature envelope are
//! computed once and committed as the first two entries, after which the
//! descriptor set cannot grow. Resource bytes may arrive later, in any
//! order, and stream straight through a digest check into the archive.
//!
//! The archive framing is strictly sequential, so entry writes are
//! serialized behind a fair async mutex: `add_resource` calls may be
//! issued without awaiting each other and execute in issue order, each
//! beginning only once the previous entry has fully flushed.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::archive::ArchiveWriter;
use crate::contents::{
    self, ContentsDocument, ResourceDescriptor, SignatureEnvelope, BUNDLE_VERSION, CONTENTS_JSON,
    CONTENTS_SIG,
};
use crate::digest::sha256_hex;
use crate::error::BundleError;
use crate::hasher::Hasher;
use crate::signer;

/// Private key material for signing the contents document.
pub struct SignOptions {
    /// PKCS#8 PEM-encoded private key.
    pub private_key_pem: String,
}

/// Construction parameters for a [`WritableBundle`].
pub struct BundleOptions<T> {
    /// Caller-defined bundle type, checked by the reader.
    pub bundle_type: String,
    /// Opaque manifest payload.
    pub manifest: T,
    /// The complete resource list; it cannot grow after construction.
    pub resources: Vec<ResourceDescriptor>,
    /// Sign the contents document iff a private key is supplied.
    pub sign: Option<SignOptions>,
}

#[derive(Debug)]
enum WriterPhase {
    Open,
    Finalized,
    Aborted,
}

#[derive(Debug)]
struct WriterState<W> {
    archive: ArchiveWriter<W>,
    /// Storage keys with a physical entry already written.
    written_keys: HashSet<String>,
    /// Resource ids whose payload is accounted for.
    satisfied: HashSet<String>,
    phase: WriterPhase,
}

/// Streaming bundle writer over any `AsyncWrite` sink.
#[derive(Debug)]
pub struct WritableBundle<W> {
    state: Mutex<WriterState<W>>,
    descriptors: HashMap<String, ResourceDescriptor>,
}

impl<W: AsyncWrite + Unpin> WritableBundle<W> {
    /// Open a bundle: validates the descriptor list, commits the
    /// contents document and signature envelope as the first two
    /// entries, and leaves the writer ready for resource payloads.
    pub async fn new<T: Serialize>(
        writer: W,
        options: BundleOptions<T>,
    ) -> Result<Self, BundleError> {
        let document = ContentsDocument {
            version: BUNDLE_VERSION.to_string(),
            bundle_type: options.bundle_type,
            manifest: options.manifest,
            resources: options.resources,
        };
        let contents_json = contents::encode(&document)?;

        let envelope = SignatureEnvelope {
            digest: sha256_hex(&contents_json),
            signature: match &options.sign {
                Some(sign) => Some(signer::sign(&sign.private_key_pem, &contents_json)?),
                None => None,
            },
        };
        let envelope_json = contents::to_canonical_json(&envelope)?;

        let mut archive = ArchiveWriter::new(writer);
        archive.append_bytes(CONTENTS_JSON, &contents_json).await?;
        archive.append_bytes(CONTENTS_SIG, &envelope_json).await?;
        tracing::debug!(
            resources = document.resources.len(),
            signed = options.sign.is_some(),
            "bundle opened"
        );

        let descriptors = document
            .resources
            .into_iter()
            .map(|descriptor| (descriptor.id.clone(), descriptor))
            .collect();

        Ok(Self {
            state: Mutex::new(WriterState {
                archive,
                written_keys: HashSet::new(),
                satisfied: HashSet::new(),
                phase: WriterPhase::Open,
            }),
            descriptors,
        })
    }

    /// Stream one declared resource's bytes into the bundle.
    ///
    /// If a payload with the same storage key was already written, the
    /// call is a storage no-op that still marks `id` as satisfied. A
    /// size or digest violation is fatal to the whole archive, since the
    /// framing has already committed an entry length.
    pub async fn add_resource<S>(&self, id: &str, data: S) -> Result<(), BundleError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin,
    {
        let descriptor = self
            .descriptors
            .get(id)
            .cloned()
            .ok_or_else(|| BundleError::UnknownResource(id.to_string()))?;

        let mut state = self.state.lock().await;
        match state.phase {
            WriterPhase::Open => {}
            WriterPhase::Finalized => return Err(BundleError::AlreadyFinalized),
            WriterPhase::Aborted => return Err(BundleError::Aborted),
        }

        let key = descriptor.digest.hex().to_string();
        if state.written_keys.contains(&key) {
            tracing::debug!(id, "payload already stored, marking satisfied");
            state.satisfied.insert(descriptor.id);
            return Ok(());
        }

        let verified = Hasher::new(
            SizeGuard::new(
                data.map(|chunk| chunk.map_err(BundleError::Io)),
                descriptor.id.clone(),
                descriptor.size,
            ),
            descriptor.digest.clone(),
        );
        let result = state
            .archive
            .append_stream(&descriptor.storage_path(), descriptor.size, verified)
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(id, size = descriptor.size, "resource written");
                state.written_keys.insert(key);
                state.satisfied.insert(descriptor.id);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "resource write failed, aborting bundle");
                state.phase = WriterPhase::Aborted;
                Err(err)
            }
        }
    }

    /// Close the archive. Fails with the sorted list of unsatisfied ids
    /// if any declared resource is still missing; the bundle stays open
    /// in that case.
    pub async fn finalize(&self) -> Result<(), BundleError> {
        let mut state = self.state.lock().await;
        match state.phase {
            WriterPhase::Open => {}
            WriterPhase::Finalized => return Err(BundleError::AlreadyFinalized),
            WriterPhase::Aborted => return Err(BundleError::Aborted),
        }

        let mut missing: Vec<String> = self
            .descriptors
            .keys()
            .filter(|id| !state.satisfied.contains(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(BundleError::MissingResources(missing));
        }

        if let Err(err) = state.archive.finish().await {
            state.phase = WriterPhase::Aborted;
            return Err(BundleError::Io(err));
        }
        state.phase = WriterPhase::Finalized;
        tracing::debug!("bundle finalized");
        Ok(())
    }
}

/// Enforces the descriptor's declared length over a byte stream.
///
/// Runs upstream of the digest check so a wrong length is reported as
/// [`BundleError::SizeMismatch`] rather than as the digest mismatch it
/// would otherwise cause.
struct SizeGuard<S> {
    inner: S,
    id: String,
    expected: u64,
    seen: u64,
    finished: bool,
}

impl<S> SizeGuard<S> {
    fn new(inner: S, id: String, expected: u64) -> Self {
        Self {
            inner,
            id,
            expected,
            seen: 0,
            finished: false,
        }
    }

    fn mismatch(&self) -> BundleError {
        BundleError::SizeMismatch {
            id: self.id.clone(),
            expected: self.expected,
            actual: self.seen,
        }
    }
}

impl<S> Stream for SizeGuard<S>
where
    S: Stream<Item = Result<Bytes, BundleError>> + Unpin,
{
    type Item = Result<Bytes, BundleError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.seen += chunk.len() as u64;
                if this.seen > this.expected {
                    // Stop before writing past the declared entry length.
                    this.finished = true;
                    Poll::Ready(Some(Err(this.mismatch())))
                } else {
                    Poll::Ready(Some(Ok(chunk)))
                }
            }
            Some(Err(err)) => {
                this.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finished = true;
                if this.seen != this.expected {
                    Poll::Ready(Some(Err(this.mismatch())))
                } else {
                    Poll::Ready(None)
                }
            }
        }
    }
}
