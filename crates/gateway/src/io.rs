mod chunks;
mod decoder;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use decoder::Utf8Decoder;
pub use sse::{Error as SseError, Sse, SseEvent, SseLimits};
