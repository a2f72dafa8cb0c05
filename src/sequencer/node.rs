//! Sequencer node - one chain position's write proxy.
//!
//! A node accepts its producer's bytes at any time. Until the sink has been
//! handed to it, bytes go into an in-memory buffer; the moment the sink
//! arrives the buffer is flushed ahead of any newer bytes, and from then on
//! writes go straight through. When the producer is done the node forwards
//! the sink to the next position.
//!
//! ```text
//! UNACQUIRED ──write/timeout──▶ BUFFERING ──handoff──▶ ACQUIRED ──close──▶ FORWARDED
//!      │                            │                      │
//!      └────────────── cancel ──────┴──────────────────────┴──▶ FAILED
//! ```

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::handoff::{HandoffDropped, HandoffReceiver, HandoffSender};

/// Observable state of a live node. `FORWARDED` and `FAILED` are terminal and
/// consume the node, so they never show up here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// No sink yet and nothing buffered
    Unacquired,
    /// No sink yet; bytes are waiting in the buffer
    Buffering,
    /// This node owns the sink
    Acquired,
}

/// What ended one bounded acquisition wait
enum Wake<W> {
    Delivered(W),
    Dropped,
    TimedOut,
    Cancelled,
}

/// Write proxy for one chain position.
///
/// Exactly one node owns the sink at any time; ownership moves by value
/// through the handoff slots, so no lock guards the sink itself.
pub struct SequencerNode<W> {
    index: usize,
    sink: Option<W>,
    upstream: Option<HandoffReceiver<W>>,
    downstream: HandoffSender<W>,
    buffer: Vec<u8>,
    cancel: CancellationToken,
    handoff_wait: Duration,
    written: u64,
}

impl<W> SequencerNode<W> {
    /// Create the node for position `index`.
    ///
    /// If `upstream` already holds the sink (the head of a chain), the node
    /// takes it immediately and starts out [`NodeState::Acquired`].
    pub fn new(
        index: usize,
        mut upstream: HandoffReceiver<W>,
        downstream: HandoffSender<W>,
        cancel: CancellationToken,
        handoff_wait: Duration,
    ) -> Self {
        let sink = upstream.try_take();
        let upstream = if sink.is_some() {
            None
        } else {
            Some(upstream)
        };

        Self {
            index,
            sink,
            upstream,
            downstream,
            buffer: Vec::new(),
            cancel,
            handoff_wait,
            written: 0,
        }
    }

    /// Launch position of this node
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current state
    pub fn state(&self) -> NodeState {
        if self.sink.is_some() {
            NodeState::Acquired
        } else if self.buffer.is_empty() {
            NodeState::Unacquired
        } else {
            NodeState::Buffering
        }
    }

    /// Bytes held back waiting for this node's turn
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes this node has delivered to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// True once the shared cancellation token has fired
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The shared cancellation token this node observes
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Failure-path exit: hand on the sink if this node holds it, drop everything else.
    ///
    /// Buffered bytes are discarded and the sink is not flushed. A node that
    /// never acquired the sink simply goes away, which its successor observes
    /// as [`Error::ChainBroken`].
    pub fn abandon(mut self) {
        tracing::debug!(
            index = self.index,
            buffered = self.buffer.len(),
            held_sink = self.sink.is_some(),
            "abandoning chain position"
        );
        if let Some(sink) = self.sink.take() {
            // Nobody left to receive it is fine on this path.
            let _ = self.downstream.forward(sink);
        }
    }
}

impl<W> SequencerNode<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Accept bytes from the producer.
    ///
    /// Writes straight to the sink when this node owns it. Otherwise waits up
    /// to the handoff bound for the sink; if it arrives the buffer is flushed
    /// first and `bytes` follow, if not `bytes` are buffered and the call
    /// returns `Ok` so the producer can keep reading.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.acquire().await? {
            Some(sink) => sink.write_all(bytes).await.map_err(Error::SinkWrite)?,
            None => {
                self.buffer.extend_from_slice(bytes);
                tracing::trace!(
                    index = self.index,
                    buffered = self.buffer.len(),
                    "not this position's turn yet, buffered chunk"
                );
                return Ok(());
            }
        }

        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Success-path exit: make sure the buffer reached the sink, then forward it.
    ///
    /// A node that has not been handed the sink yet keeps waiting, one bounded
    /// round at a time, until it is (or the chain is cancelled). Returns the
    /// number of bytes this position wrote.
    pub async fn close(mut self) -> Result<u64> {
        let mut rounds = 0u32;
        while self.acquire().await?.is_none() {
            rounds += 1;
            tracing::debug!(
                index = self.index,
                rounds,
                buffered = self.buffer.len(),
                "producer finished before its turn, still waiting for the sink"
            );
        }

        let Some(mut sink) = self.sink.take() else {
            return Err(Error::ChainBroken);
        };
        sink.flush().await.map_err(Error::SinkWrite)?;

        if self.downstream.forward(sink).is_err() {
            tracing::debug!(
                index = self.index,
                "next position is gone, dropping the sink"
            );
        }
        tracing::debug!(
            index = self.index,
            bytes = self.written,
            "forwarded sink"
        );
        Ok(self.written)
    }

    /// Obtain the sink, waiting at most one handoff bound.
    ///
    /// `Ok(None)` means "not yet". The buffer is flushed into the sink at the
    /// moment it is received, before the caller gets to write anything else.
    async fn acquire(&mut self) -> Result<Option<&mut W>> {
        if self.sink.is_none() {
            let Some(upstream) = self.upstream.as_mut() else {
                return Err(Error::ChainBroken);
            };

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                received = upstream => match received {
                    Ok(sink) => Wake::Delivered(sink),
                    Err(HandoffDropped) => Wake::Dropped,
                },
                _ = tokio::time::sleep(self.handoff_wait) => Wake::TimedOut,
            };

            match wake {
                Wake::Delivered(mut sink) => {
                    self.upstream = None;
                    let buffered = std::mem::take(&mut self.buffer);
                    tracing::debug!(
                        index = self.index,
                        buffered = buffered.len(),
                        "sink handed off"
                    );
                    if !buffered.is_empty() {
                        sink.write_all(&buffered).await.map_err(Error::SinkWrite)?;
                        self.written += buffered.len() as u64;
                    }
                    self.sink = Some(sink);
                }
                Wake::TimedOut => return Ok(None),
                Wake::Cancelled => return Err(Error::Cancelled),
                Wake::Dropped => {
                    self.upstream = None;
                    return Err(Error::ChainBroken);
                }
            }
        }

        Ok(self.sink.as_mut())
    }
}
