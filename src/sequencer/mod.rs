//! Ordered handoff of a single sink across concurrently running producers.
//!
//! Split into focused submodules:
//! - [`handoff`] - Single-slot channel that moves the sink between positions
//! - [`node`] - Per-position write proxy that buffers until its turn

pub mod handoff;
mod node;


pub use handoff::{HandoffDropped, HandoffReceiver, HandoffSender};
pub use node::{NodeState, SequencerNode};
