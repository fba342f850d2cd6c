use std::error::Error;

use crate::error::ErrorKind;
use crate::request::CompletionRequest;
use crate::response::CompletionStream;

/// The error type for a completion provider.
pub trait CompletionProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a completion backend.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
pub trait CompletionProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: CompletionProviderError;

    /// The stream type for this provider.
    type Stream: CompletionStream<Error = Self::Error>;

    /// Sends a request to the backend.
    ///
    /// The returned future resolves once the response headers are known.
    /// An error here means the request was rejected and no frames will
    /// ever be produced for it; the body must not be read.
    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
