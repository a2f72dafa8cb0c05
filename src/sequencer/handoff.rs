//! Handoff channel - a single-slot relay that moves the sink from one node to the next.
//!
//! The slot holds at most one value and the sending half is consumed by
//! [`HandoffSender::forward`], so a second forward cannot be expressed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Create a connected handoff pair.
pub fn channel<W>() -> (HandoffSender<W>, HandoffReceiver<W>) {
    let (tx, rx) = oneshot::channel();
    (HandoffSender(tx), HandoffReceiver(rx))
}

/// Create a receiver whose slot already holds `sink`.
///
/// This is how the real sink enters a chain: the first node finds it
/// immediately and starts out owning it.
pub fn seeded<W>(sink: W) -> HandoffReceiver<W> {
    let (tx, rx) = oneshot::channel();
    // The receiver is alive right here, so the send cannot fail.
    let _ = tx.send(sink);
    HandoffReceiver(rx)
}

/// Write end of a handoff slot, owned by the node that will forward the sink.
#[derive(Debug)]
pub struct HandoffSender<W>(oneshot::Sender<W>);

impl<W> HandoffSender<W> {
    /// Place the sink in the slot for the next node.
    ///
    /// Returns the sink back if the receiving side is already gone.
    pub fn forward(self, sink: W) -> Result<(), W> {
        self.0.send(sink)
    }
}

/// The receiving half was dropped without a value ever being forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffDropped;

/// Read end of a handoff slot.
///
/// Awaiting it resolves once the predecessor forwards the sink, or with
/// [`HandoffDropped`] if the predecessor is dropped first.
#[derive(Debug)]
pub struct HandoffReceiver<W>(oneshot::Receiver<W>);

impl<W> HandoffReceiver<W> {
    /// Take the sink if it is already in the slot, without waiting.
    pub fn try_take(&mut self) -> Option<W> {
        self.0.try_recv().ok()
    }
}

impl<W> Future for HandoffReceiver<W> {
    type Output = Result<W, HandoffDropped>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map_err(|_| HandoffDropped)
    }
}
