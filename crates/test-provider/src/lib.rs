//! A local scripted completion provider for testing purpose.

mod script;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use zyquence_model::{
    CompletionProvider, CompletionProviderError, CompletionRequest,
    CompletionStream, ErrorKind, Role, StreamFrame,
};

pub use script::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl CompletionProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct ScriptedStream {
    response: ScriptedResponse,
    delay: Duration,
    frame_idx: usize,
    finished: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl CompletionStream for ScriptedStream {
    type Error = crate::Error;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        if this.response.interrupt_after == Some(this.frame_idx) {
            this.finished = true;
            return Poll::Ready(Err(Error {
                message: "scripted interruption",
                kind: ErrorKind::Interrupted,
            }));
        }

        let frames = &this.response.frames;
        if this.frame_idx >= frames.len() {
            if this.response.stall {
                // Never wakes up again, the caller has to give up.
                return Poll::Pending;
            }
            this.finished = true;
            return Poll::Ready(Ok(None));
        }

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let frame = match &frames[this.frame_idx] {
                ScriptedFrame::Delta(text) => StreamFrame::delta(text.clone()),
                ScriptedFrame::Done => {
                    this.finished = true;
                    StreamFrame::terminal()
                }
            };
            this.frame_idx += 1;
            return Poll::Ready(Ok(Some(frame)));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_frame(cx)
    }
}

/// A local scripted provider for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how
/// the provider should answer each user turn. The response is selected by
/// the number of user messages in the request, so the first user message
/// gets the first response, and so on. If there are no enough responses
/// in the script, the request is rejected.
///
/// Every request is recorded and can be inspected with
/// [`ScriptedProvider::requests`].
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Vec<ScriptedResponse>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    #[inline]
    pub fn add_response(&mut self, response: ScriptedResponse) {
        self.script.push(response);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far.
    #[inline]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Debug for ScriptedProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("script", &self.script.len())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl CompletionProvider for ScriptedProvider {
    type Error = crate::Error;
    type Stream = ScriptedStream;

    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let user_turns = req
            .messages
            .iter()
            .filter(|msg| msg.role == Role::User)
            .count();
        let result = 'blk: {
            let Some(response) = user_turns
                .checked_sub(1)
                .and_then(|idx| self.script.get(idx))
            else {
                break 'blk Err(Error {
                    message: "no enough responses",
                    kind: ErrorKind::Rejected,
                });
            };
            if let Some(kind) = response.rejection {
                break 'blk Err(Error {
                    message: "scripted rejection",
                    kind,
                });
            }
            Ok(ScriptedStream {
                response: response.clone(),
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                frame_idx: 0,
                finished: false,
                sleep: None,
            })
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use zyquence_model::ChatMessage;

    use super::*;

    async fn collect(
        stream: ScriptedStream,
    ) -> (Vec<StreamFrame>, Option<Error>) {
        let mut stream = pin!(stream);
        let mut frames = vec![];
        loop {
            match poll_fn(|cx| stream.as_mut().poll_next_frame(cx)).await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return (frames, None),
                Err(err) => return (frames, Some(err)),
            }
        }
    }

    fn request(turns: &[&str]) -> CompletionRequest {
        CompletionRequest {
            messages: turns
                .iter()
                .map(|t| ChatMessage::new(Role::User, *t))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_responses_follow_user_turns() {
        let mut provider = ScriptedProvider::default();
        provider.add_response(ScriptedResponse::with_deltas(["Hello, ", "world!"]));
        provider.add_response(ScriptedResponse::with_deltas(["Again"]));

        let stream = provider.send_request(&request(&["Hi"])).await.unwrap();
        let (frames, err) = collect(stream).await;
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                StreamFrame::delta("Hello, "),
                StreamFrame::delta("world!"),
                StreamFrame::terminal(),
            ]
        );

        let stream = provider
            .send_request(&request(&["Hi", "Once more"]))
            .await
            .unwrap();
        let (frames, _) = collect(stream).await;
        assert_eq!(frames[0], StreamFrame::delta("Again"));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_and_missing_script() {
        let mut provider = ScriptedProvider::default();
        provider.add_response(ScriptedResponse::rejected(ErrorKind::RateLimited));

        let err = provider.send_request(&request(&["Hi"])).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = provider
            .send_request(&request(&["Hi", "Again"]))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_interruption() {
        let mut provider = ScriptedProvider::default();
        provider.add_response(
            ScriptedResponse::with_deltas(["Hel", "lo", "!"]).interrupted_after(2),
        );
        let stream = provider.send_request(&request(&["Hi"])).await.unwrap();
        let (frames, err) = collect(stream).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(err.unwrap().kind(), ErrorKind::Interrupted);
    }
}
