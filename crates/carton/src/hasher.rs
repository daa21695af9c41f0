//! Digest-verifying stream transform.
//!
//! [`Hasher`] forwards every chunk of an inbound byte stream unchanged
//! while feeding it into a running hash. The comparison against the
//! expected digest can only happen at end-of-stream, so consumers must
//! treat already-forwarded bytes as provisional until the stream
//! terminates cleanly.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::digest::{Digest, DigestContext};
use crate::error::{BundleError, DigestError};

/// A byte stream that hashes everything flowing through it and fails at
/// end-of-stream if the computed digest differs from the expected one.
#[derive(Debug)]
pub struct Hasher<S> {
    inner: S,
    expected: Digest,
    context: Option<DigestContext>,
}

impl<S> Hasher<S> {
    /// Wrap a stream, verifying it against `expected` at end-of-stream.
    pub fn new(inner: S, expected: Digest) -> Self {
        let context = expected.algorithm().context();
        Self {
            inner,
            expected,
            context: Some(context),
        }
    }

    /// The digest this stream is being verified against.
    pub fn expected(&self) -> &Digest {
        &self.expected
    }
}

impl<S> Stream for Hasher<S>
where
    S: Stream<Item = Result<Bytes, BundleError>> + Unpin,
{
    type Item = Result<Bytes, BundleError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        // A consumed context means the stream already terminated, either
        // cleanly, with a mismatch, or with a forwarded upstream error.
        let Some(context) = this.context.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                context.update(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => {
                // Upstream failed: the digest check no longer applies.
                this.context = None;
                Poll::Ready(Some(Err(err)))
            }
            None => match this.context.take() {
                Some(context) => {
                    let actual = context.finalize_hex();
                    if actual == this.expected.hex() {
                        Poll::Ready(None)
                    } else {
                        let err = DigestError::Mismatch {
                            expected: this.expected.to_string(),
                            actual: format!("{}:{}", this.expected.algorithm(), actual),
                        };
                        Poll::Ready(Some(Err(err.into())))
                    }
                }
                None => Poll::Ready(None),
            },
        }
    }
}
