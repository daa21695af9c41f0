//! Sequential iteration over archive entries.
//!
//! A driver task owns the archive decode and pumps entries through
//! bounded channels, giving the consumer two mutually exclusive modes:
//!
//! - **pull**: `next_entry()` awaits one entry at a time; `&mut self`
//!   statically rules out concurrent calls.
//! - **hand-off**: `handoff()` permanently converts the iterator into a
//!   push-style stream delivering every remaining entry, buffered ones
//!   included.
//!
//! Decode errors are queued like entries and delivered to the first
//! pending consumer rather than dropped. Dropping the consumer cancels
//! the driver.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::archive::ArchiveReader;
use crate::error::BundleError;

/// Entries buffered ahead of the consumer.
const ENTRY_BUFFER: usize = 1;

/// Body chunks buffered per entry; bounds how far the driver can run
/// ahead of a slow consumer.
const CHUNK_BUFFER: usize = 16;

/// One named entry pulled out of the archive.
pub(crate) struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub data: EntryData,
}

/// The byte stream of a single entry's body.
#[derive(Debug)]
pub(crate) struct EntryData {
    rx: mpsc::Receiver<Result<Bytes, BundleError>>,
}

impl EntryData {
    pub(crate) async fn next_chunk(&mut self) -> Option<Result<Bytes, BundleError>> {
        self.rx.recv().await
    }

    /// Drain the body into memory. Only used for the two small header
    /// entries; resource bodies stay streamed.
    pub(crate) async fn read_to_vec(mut self) -> Result<Vec<u8>, BundleError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl Stream for EntryData {
    type Item = Result<Bytes, BundleError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Aborts the driver task when the last consumer handle goes away.
struct DriverGuard(JoinHandle<()>);

impl Drop for DriverGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Pull-mode iterator over the archive's entries.
pub(crate) struct EntryIterator {
    rx: mpsc::Receiver<Result<ArchiveEntry, BundleError>>,
    driver: DriverGuard,
}

impl EntryIterator {
    pub(crate) fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(ENTRY_BUFFER);
        let driver = tokio::spawn(drive(ArchiveReader::new(reader), tx));
        Self {
            rx,
            driver: DriverGuard(driver),
        }
    }

    /// Await the next entry, or `None` at the end of the archive.
    pub(crate) async fn next_entry(&mut self) -> Option<Result<ArchiveEntry, BundleError>> {
        self.rx.recv().await
    }

    /// Switch permanently to push-style delivery.
    pub(crate) fn handoff(self) -> EntryStream {
        EntryStream {
            rx: self.rx,
            _driver: self.driver,
        }
    }
}

/// Push-mode remainder of the iteration.
pub(crate) struct EntryStream {
    rx: mpsc::Receiver<Result<ArchiveEntry, BundleError>>,
    _driver: DriverGuard,
}

impl EntryStream {
    pub(crate) async fn next_entry(&mut self) -> Option<Result<ArchiveEntry, BundleError>> {
        self.rx.recv().await
    }
}

impl Stream for EntryStream {
    type Item = Result<ArchiveEntry, BundleError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Decode loop: one entry body in flight at a time, strictly in storage
/// order.
async fn drive<R: AsyncRead + Unpin>(
    mut archive: ArchiveReader<R>,
    tx: mpsc::Sender<Result<ArchiveEntry, BundleError>>,
) {
    loop {
        let header = match archive.next_header().await {
            Ok(Some(header)) => header,
            Ok(None) => return,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        };
        tracing::trace!(name = %header.name, size = header.size, "archive entry");

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        let entry = ArchiveEntry {
            name: header.name,
            size: header.size,
            data: EntryData { rx: chunk_rx },
        };
        if tx.send(Ok(entry)).await.is_err() {
            return;
        }

        loop {
            match archive.next_chunk().await {
                Ok(Some(chunk)) => {
                    if chunk_tx.send(Ok(chunk)).await.is_err() {
                        // Entry dropped undrained; the reader skips the
                        // rest of the body before the next header.
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    // Framing failure is terminal for the whole archive.
                    // Deliver it to the open entry and to the iterator so
                    // neither consumer mistakes it for a clean end.
                    let copy = BundleError::Archive(err.to_string());
                    let _ = chunk_tx.send(Err(err)).await;
                    let _ = tx.send(Err(copy)).await;
                    return;
                }
            }
        }
    }
}
