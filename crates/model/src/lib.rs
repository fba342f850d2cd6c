//! Protocol types shared by every completion backend.
//!
//! A completion backend accepts a list of chat messages plus a system
//! prompt and answers with a stream of text deltas. This crate pins down
//! that contract so the conversation logic can be written once and run
//! against the HTTP gateway in production and a scripted backend in
//! tests.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
