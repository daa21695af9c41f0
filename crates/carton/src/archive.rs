//! Sequential tar framing over async byte streams.
//!
//! The bundle's physical layout is plain USTAR: a 512-byte header block
//! per entry, the entry body padded to the block size, and a two-block
//! zero trailer. Header encoding and decoding go through `tar::Header`;
//! this module only adds the single-pass async plumbing around it:
//! "append a named entry of known length" on the write side and "read
//! the next named entry" on the read side.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::BundleError;

pub(crate) const BLOCK_SIZE: usize = 512;

/// Read chunk size for entry bodies.
pub(crate) const CHUNK_SIZE: usize = 8 * 1024;

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Byte range of the checksum field inside a header block.
const CKSUM_FIELD: std::ops::Range<usize> = 148..156;

fn padding_len(size: u64) -> usize {
    let rem = (size % BLOCK_SIZE as u64) as usize;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

fn file_header(name: &str, size: u64) -> io::Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(size);
    header.set_mode(0o644);
    // Zero mtime keeps identical inputs byte-identical on the wire.
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    Ok(header)
}

/// Header checksum: sum of all block bytes with the checksum field
/// itself read as ASCII spaces.
fn block_checksum(block: &[u8; BLOCK_SIZE]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if CKSUM_FIELD.contains(&i) {
                b' ' as u64
            } else {
                *b as u64
            }
        })
        .sum()
}

/// Parse a NUL/space-terminated octal header field.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let text: String = field
        .iter()
        .skip_while(|b| **b == b' ' || **b == 0)
        .take_while(|b| b.is_ascii_digit())
        .map(|b| *b as char)
        .collect();
    if text.is_empty() {
        return None;
    }
    u64::from_str_radix(&text, 8).ok()
}

fn truncated() -> BundleError {
    BundleError::Archive("unexpected end of archive".to_string())
}

/// Writer half of the framing: emits entries strictly in call order.
#[derive(Debug)]
pub(crate) struct ArchiveWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> ArchiveWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Append an entry whose body is already in memory.
    pub(crate) async fn append_bytes(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let header = file_header(name, data.len() as u64)?;
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(data).await?;
        self.write_padding(data.len() as u64).await
    }

    /// Append an entry of declared length, streaming the body through.
    ///
    /// Returns the actual number of body bytes written; the caller is
    /// responsible for comparing it against the declared size. The body
    /// is padded to the block boundary of the actual count so framing
    /// stays aligned even when the declaration was wrong.
    pub(crate) async fn append_stream<S>(
        &mut self,
        name: &str,
        size: u64,
        mut data: S,
    ) -> Result<u64, BundleError>
    where
        S: Stream<Item = Result<Bytes, BundleError>> + Unpin,
    {
        let header = file_header(name, size).map_err(BundleError::Io)?;
        self.inner.write_all(header.as_bytes()).await?;

        let mut written: u64 = 0;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            self.inner.write_all(&chunk).await?;
        }
        self.write_padding(written).await?;
        Ok(written)
    }

    /// Write the end-of-archive trailer and flush.
    pub(crate) async fn finish(&mut self) -> io::Result<()> {
        self.inner.write_all(&ZERO_BLOCK).await?;
        self.inner.write_all(&ZERO_BLOCK).await?;
        self.inner.flush().await
    }

    async fn write_padding(&mut self, size: u64) -> io::Result<()> {
        let pad = padding_len(size);
        if pad > 0 {
            self.inner.write_all(&ZERO_BLOCK[..pad]).await?;
        }
        Ok(())
    }
}

/// A decoded entry header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    pub name: String,
    pub size: u64,
}

/// Reader half of the framing: yields headers and body chunks strictly
/// in storage order.
pub(crate) struct ArchiveReader<R> {
    inner: R,
    /// Unread body bytes of the current entry.
    body_remaining: u64,
    /// Padding bytes after the current entry body.
    padding_remaining: usize,
}

impl<R: AsyncRead + Unpin> ArchiveReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            body_remaining: 0,
            padding_remaining: 0,
        }
    }

    /// Advance to the next entry header.
    ///
    /// Skips any unread remainder of the previous entry. Returns `None`
    /// at the end of the archive: either the zero-block trailer or a
    /// clean EOF on a block boundary.
    pub(crate) async fn next_header(&mut self) -> Result<Option<EntryHeader>, BundleError> {
        self.skip_current_entry().await?;

        let mut block = [0u8; BLOCK_SIZE];
        match self.inner.read_exact(&mut block).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(BundleError::Io(e)),
        }
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let declared = parse_octal(&block[CKSUM_FIELD])
            .ok_or_else(|| BundleError::Archive("malformed header checksum".to_string()))?;
        if declared != block_checksum(&block) {
            return Err(BundleError::Archive("header checksum mismatch".to_string()));
        }

        let mut header = tar::Header::new_old();
        header.as_mut_bytes().copy_from_slice(&block);
        let name = header
            .path()
            .map_err(|e| BundleError::Archive(format!("malformed entry name: {e}")))?
            .to_string_lossy()
            .into_owned();
        let size = header
            .entry_size()
            .map_err(|e| BundleError::Archive(format!("malformed entry size: {e}")))?;

        self.body_remaining = size;
        self.padding_remaining = padding_len(size);
        Ok(Some(EntryHeader { name, size }))
    }

    /// Read the next chunk of the current entry body, or `None` once the
    /// body is exhausted.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>, BundleError> {
        if self.body_remaining == 0 {
            return Ok(None);
        }
        let want = CHUNK_SIZE.min(self.body_remaining as usize);
        let mut buf = vec![0u8; want];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => truncated(),
                _ => BundleError::Io(e),
            })?;
        self.body_remaining -= want as u64;
        Ok(Some(Bytes::from(buf)))
    }

    /// Discard whatever is left of the current entry, padding included.
    async fn skip_current_entry(&mut self) -> Result<(), BundleError> {
        while self.next_chunk().await?.is_some() {}
        if self.padding_remaining > 0 {
            let mut pad = [0u8; BLOCK_SIZE];
            let want = self.padding_remaining;
            self.inner
                .read_exact(&mut pad[..want])
                .await
                .map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof => truncated(),
                    _ => BundleError::Io(e),
                })?;
            self.padding_remaining = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_body<R: AsyncRead + Unpin>(
        reader: &mut ArchiveReader<R>,
    ) -> Result<Vec<u8>, BundleError> {
        let mut body = Vec::new();
        while let Some(chunk) = reader.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn stream_of(data: &[u8]) -> impl Stream<Item = Result<Bytes, BundleError>> + Unpin {
        futures::stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
    }

    #[tokio::test]
    async fn round_trips_entries() {
        let mut buffer = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buffer);
        writer.append_bytes("contents.json", b"{}").await.unwrap();
        let written = writer
            .append_stream("resources/abc", 5, stream_of(b"hello"))
            .await
            .unwrap();
        assert_eq!(written, 5);
        writer.finish().await.unwrap();
        drop(writer);

        // Everything block-aligned: header + body blocks + trailer.
        assert_eq!(buffer.len() % BLOCK_SIZE, 0);

        let mut reader = ArchiveReader::new(std::io::Cursor::new(buffer));
        let first = reader.next_header().await.unwrap().unwrap();
        assert_eq!(first.name, "contents.json");
        assert_eq!(first.size, 2);
        assert_eq!(collect_body(&mut reader).await.unwrap(), b"{}");

        let second = reader.next_header().await.unwrap().unwrap();
        assert_eq!(second.name, "resources/abc");
        assert_eq!(second.size, 5);
        assert_eq!(collect_body(&mut reader).await.unwrap(), b"hello");

        assert!(reader.next_header().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_unread_bodies() {
        let mut buffer = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buffer);
        writer.append_bytes("first", &[7u8; 1000]).await.unwrap();
        writer.append_bytes("second", b"tail").await.unwrap();
        writer.finish().await.unwrap();
        drop(writer);

        let mut reader = ArchiveReader::new(std::io::Cursor::new(buffer));
        reader.next_header().await.unwrap().unwrap();
        // Do not read the first body at all.
        let second = reader.next_header().await.unwrap().unwrap();
        assert_eq!(second.name, "second");
        assert_eq!(collect_body(&mut reader).await.unwrap(), b"tail");
    }

    #[tokio::test]
    async fn truncated_body_is_an_archive_error() {
        let mut buffer = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buffer);
        writer.append_bytes("entry", &[1u8; 600]).await.unwrap();
        writer.finish().await.unwrap();
        drop(writer);

        buffer.truncate(BLOCK_SIZE + 100);
        let mut reader = ArchiveReader::new(std::io::Cursor::new(buffer));
        reader.next_header().await.unwrap().unwrap();
        let mut saw_error = false;
        loop {
            match reader.next_chunk().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(BundleError::Archive(_)) => {
                    saw_error = true;
                    break;
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn corrupt_checksum_is_rejected() {
        let mut buffer = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buffer);
        writer.append_bytes("entry", b"data").await.unwrap();
        writer.finish().await.unwrap();
        drop(writer);

        // Flip a byte inside the header's name field.
        buffer[0] ^= 0xff;
        let mut reader = ArchiveReader::new(std::io::Cursor::new(buffer));
        match reader.next_header().await {
            Err(BundleError::Archive(msg)) => assert!(msg.contains("checksum")),
            other => panic!("expected checksum error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn interoperates_with_the_tar_crate() {
        // A bundle produced by this writer must be a valid plain tar
        // archive as far as the tar crate is concerned.
        let mut buffer = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buffer);
        writer.append_bytes("contents.json", b"{\"a\":1}").await.unwrap();
        writer.append_bytes("resources/ff00", b"payload").await.unwrap();
        writer.finish().await.unwrap();
        drop(writer);

        let mut archive = tar::Archive::new(std::io::Cursor::new(buffer));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["contents.json", "resources/ff00"]);
    }
}
