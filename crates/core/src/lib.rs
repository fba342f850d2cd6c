//! Core logic of a streamed conversation: the transcript, the frame
//! accumulator, the request/response controller and its session.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod accumulator;
mod completion_client;
mod controller;
mod notice;
mod parsed;
pub mod session;
pub mod text;
pub mod transcript;

pub use accumulator::MessageAccumulator;
pub use controller::{
    CancelHandle, Completion, ControllerError, ControllerState,
    ConversationBuilder, ConversationController, ConversationHandle,
};
pub use notice::Notice;
pub use parsed::{Expect, ParsedCompletion, SchemaMismatch, parse_structured};
pub use session::{
    JsonFileStore, MemoryStore, SessionContext, SessionError, SessionStore,
};
pub use text::GeneratedFile;
pub use transcript::{Message, Transcript};
