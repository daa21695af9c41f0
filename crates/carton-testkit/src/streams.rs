//! Canned byte-stream suppliers.
//!
//! Resource payloads enter the writer as `Stream<Item = io::Result<Bytes>>`;
//! these helpers build the common shapes tests need.

use bytes::Bytes;
use futures::Stream;

/// The whole payload as a single chunk.
pub fn byte_stream(data: &[u8]) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin {
    futures::stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
}

/// The payload split into `chunk_size`-byte chunks, exercising
/// incremental hashing and framing.
pub fn chunked_stream(
    data: &[u8],
    chunk_size: usize,
) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin {
    let chunks: Vec<std::io::Result<Bytes>> = data
        .chunks(chunk_size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    futures::stream::iter(chunks)
}

/// Yields `prefix`, then fails with an I/O error carrying `message`.
pub fn failing_stream(
    prefix: &[u8],
    message: &str,
) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin {
    futures::stream::iter(vec![
        Ok(Bytes::copy_from_slice(prefix)),
        Err(std::io::Error::other(message.to_string())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn chunked_stream_preserves_content() {
        let mut stream = chunked_stream(b"abcdefg", 3);
        let mut out = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
            chunks += 1;
        }
        assert_eq!(out, b"abcdefg");
        assert_eq!(chunks, 3);
    }

    #[tokio::test]
    async fn failing_stream_fails_after_prefix() {
        let mut stream = failing_stream(b"he", "boom");
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"he");
        assert!(stream.next().await.unwrap().is_err());
    }
}
