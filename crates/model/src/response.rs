use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::CompletionProviderError;

/// One decoded unit of a streamed completion.
///
/// Frames are transient: they are folded into the conversation as they
/// arrive and never stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFrame {
    /// The text to append, if the frame carries any.
    pub delta_text: Option<String>,
    /// Set on the sentinel frame that ends the response.
    pub terminal: bool,
}

impl StreamFrame {
    /// Creates a frame carrying a piece of text.
    #[inline]
    pub fn delta<S: Into<String>>(text: S) -> Self {
        Self {
            delta_text: Some(text.into()),
            terminal: false,
        }
    }

    /// Creates the terminal frame.
    #[inline]
    pub fn terminal() -> Self {
        Self {
            delta_text: None,
            terminal: true,
        }
    }
}

/// A streamed response from the completion provider.
pub trait CompletionStream: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: CompletionProviderError;

    /// Attempts to pull out the next frame from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   more data. Implementations will ensure that the current task will
    ///   be notified when the next frame may be ready.
    /// - `Poll::Ready(Ok(Some(frame)))` means the response has a frame to
    ///   deliver, and may produce further frames on subsequent calls.
    ///   A terminal frame is always the last one.
    /// - `Poll::Ready(Ok(None))` means the underlying data ended.
    /// - `Poll::Ready(Err(error))` means the stream broke. Frames already
    ///   delivered stay valid.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>>;
}
