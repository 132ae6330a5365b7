//! Ingestion boundary between producers and the per-kind queues.
//!
//! In-process producers can call [`EntityQueues::publish`] directly. When
//! producers live behind a message-passing boundary, an [`EventSource`]
//! feeds the same queues through [`run_ingest`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::queue::EntityQueues;
use crate::types::EntityChange;

/// A stream of changes from outside the process (or another task).
#[async_trait]
pub trait EventSource: Send {
    /// Next change, an error for a message that could not be read, or
    /// `None` when the source is closed.
    async fn recv(&mut self) -> Option<Result<EntityChange, IngestError>>;
}

/// Decode one `{"kind": ..., "entity": {...}}` message.
pub fn decode_change(bytes: &[u8]) -> Result<EntityChange, IngestError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Bounded in-process channel source.
pub struct ChannelSource {
    rx: mpsc::Receiver<EntityChange>,
}

/// Create a channel whose receiving half is an [`EventSource`].
pub fn channel(capacity: usize) -> (mpsc::Sender<EntityChange>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, ChannelSource { rx })
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn recv(&mut self) -> Option<Result<EntityChange, IngestError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Publish everything `source` yields until it closes.
///
/// Unreadable messages are logged and skipped. Returns the number of
/// changes published.
pub async fn run_ingest<S: EventSource>(mut source: S, queues: Arc<EntityQueues>) -> usize {
    let mut published = 0usize;
    while let Some(next) = source.recv().await {
        match next {
            Ok(change) => {
                queues.publish(change);
                published += 1;
            }
            Err(err) => warn!(error = %err, "skipping unreadable change"),
        }
    }
    debug!(published, "event source closed");
    published
}

/// Decode newline-delimited JSON changes from `reader` into `tx`.
///
/// Blank and undecodable lines are skipped. Stops at end of input, on the
/// first read error, or once the receiving side is gone. Returns the number
/// of changes forwarded.
pub async fn forward_lines<R>(reader: R, tx: mpsc::Sender<EntityChange>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "line source failed, closing");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_change(line.as_bytes()) {
            Ok(change) => {
                if tx.send(change).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(err) => warn!(error = %err, "skipping unreadable line"),
        }
    }
    debug!(forwarded, "line source closed");
    forwarded
}
