use std::fmt::{self, Debug};
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tracing::Instrument;
use zyquence_model::{
    CompletionProvider, CompletionProviderError, CompletionRequest,
    CompletionStream, StreamFrame,
};

type SendRequestResult = Result<FrameStream, Box<dyn CompletionProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(CompletionRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a completion provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct CompletionClient {
    handler_fn: HandlerFn,
}

impl CompletionClient {
    #[inline]
    pub fn new<P: CompletionProvider + 'static>(provider: P) -> Self {
        // The controller has no generic parameter, so `P` is erased here.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!(
                        "sending a request with {} messages",
                        req.messages.len()
                    );
                    match fut.await {
                        Ok(stream) => Ok(FrameStream::new(stream)),
                        Err(err) => {
                            warn!("request rejected: {err}");
                            Err(Box::new(err) as Box<dyn CompletionProviderError>)
                        }
                    }
                }
                .instrument(trace_span!("completion client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and resolves once the response is accepted.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the future drops the pending
    /// request along with it.
    #[inline]
    pub async fn send_request(&self, req: CompletionRequest) -> SendRequestResult {
        (self.handler_fn)(req).await
    }
}

impl Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient").finish_non_exhaustive()
    }
}

trait DynStream: Send {
    fn poll_next_frame(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Box<dyn CompletionProviderError>>>;
}

struct ErasedStream<S> {
    inner: Pin<Box<S>>,
}

impl<S: CompletionStream> DynStream for ErasedStream<S> {
    #[inline]
    fn poll_next_frame(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Box<dyn CompletionProviderError>>>
    {
        self.inner.as_mut().poll_next_frame(cx).map_err(|err| {
            Box::new(err) as Box<dyn CompletionProviderError>
        })
    }
}

/// A type-erased stream of frames for one accepted request.
///
/// Dropping the stream releases the underlying connection.
pub struct FrameStream {
    inner: Box<dyn DynStream>,
}

impl FrameStream {
    fn new<S: CompletionStream>(stream: S) -> Self {
        Self {
            inner: Box::new(ErasedStream {
                inner: Box::pin(stream),
            }),
        }
    }

    /// Waits for the next frame.
    ///
    /// `Ok(None)` means the underlying data ended.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. No frame is lost when the future is
    /// dropped before completion.
    #[inline]
    pub async fn next_frame(
        &mut self,
    ) -> Result<Option<StreamFrame>, Box<dyn CompletionProviderError>> {
        poll_fn(|cx| self.inner.poll_next_frame(cx)).await
    }
}

impl Debug for FrameStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use zyquence_model::{ChatMessage, ErrorKind, Role};
    use zyquence_test_provider::{ScriptedProvider, ScriptedResponse};

    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::new(Role::User, "Hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = ScriptedProvider::default();
        provider.add_response(ScriptedResponse::with_deltas([
            "How ", "are ", "you?",
        ]));
        let client = CompletionClient::new(provider);

        for _ in 0..3 {
            let mut stream = client.send_request(request()).await.unwrap();
            let mut text = String::new();
            let mut terminated = false;
            while let Some(frame) = stream.next_frame().await.unwrap() {
                text.push_str(frame.delta_text.as_deref().unwrap_or_default());
                terminated |= frame.terminal;
            }
            assert_eq!(text, "How are you?");
            assert!(terminated);
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let client = CompletionClient::new(ScriptedProvider::default());
        let err = client.send_request(request()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }
}
