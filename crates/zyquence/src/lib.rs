//! Streaming AI chat for the Zyquence features.
//!
//! The crate wires the HTTP gateway and the conversation core together and
//! provides presets for each chat feature. It also ships a small terminal
//! client.

#![deny(missing_docs)]

mod assistant;

pub use assistant::{Assistant, UnknownAssistant};

/// Re-exports of [`zyquence_core`] crate.
pub mod core {
    pub use zyquence_core::*;
}

/// Re-exports of [`zyquence_gateway`] crate.
pub mod gateway {
    pub use zyquence_gateway::*;
}
