mod builder;
mod handle;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::time::timeout;
use zyquence_model::{CompletionProviderError, CompletionRequest, ErrorKind};

use crate::accumulator::MessageAccumulator;
use crate::completion_client::CompletionClient;
use crate::notice::Notice;
use crate::session::{SessionContext, SessionError, SessionStore};
use crate::transcript::Transcript;
pub use builder::ConversationBuilder;
pub use handle::ConversationHandle;

type UpdateFn = Box<dyn Fn(&Transcript) + Send + Sync>;
type DeltaFn = Box<dyn Fn(&str) + Send + Sync>;
type StateChangeFn = Box<dyn Fn(ControllerState) + Send + Sync>;

/// The phase of the request/response cycle a controller is in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Ready for a new submission.
    #[default]
    Idle,
    /// The request is out, waiting for the response to be accepted.
    Sending,
    /// Frames are being folded into the transcript.
    Streaming,
}

/// A successfully finished response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Where the assistant message lives in the transcript.
    ///
    /// `None` if the response carried no text at all.
    pub assistant_index: Option<usize>,
    /// The full assistant text.
    pub content: String,
}

/// Why a submission did not produce a complete response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerError {
    /// The input was blank, nothing was sent.
    EmptyInput,
    /// The service refused the request before streaming began. The
    /// transcript only gained the user message.
    RequestRejected(ErrorKind, String),
    /// The stream broke or ended without its terminal frame. Text that
    /// already arrived stays in the transcript.
    StreamInterrupted {
        /// What went wrong.
        kind: ErrorKind,
        /// The assistant text received before the break.
        partial: String,
    },
    /// The user cancelled the response. Text that already arrived stays
    /// in the transcript.
    Cancelled {
        /// The assistant text received before cancellation.
        partial: String,
    },
}

impl ControllerError {
    /// Returns the assistant text kept in the transcript, if any.
    pub fn partial(&self) -> Option<&str> {
        match self {
            Self::StreamInterrupted { partial, .. } | Self::Cancelled { partial } => {
                Some(partial).filter(|p| !p.is_empty()).map(String::as_str)
            }
            _ => None,
        }
    }

    /// Returns the notice to show for this error.
    ///
    /// Blank input is not worth a notice.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::EmptyInput => None,
            Self::RequestRejected(ErrorKind::TimedOut, _) => {
                Some(Notice::NoResponse)
            }
            Self::RequestRejected(kind, message) => {
                Some(Notice::from_kind(*kind, message))
            }
            Self::StreamInterrupted { kind, .. } => Some(match kind {
                ErrorKind::TimedOut => Notice::TimedOut,
                _ => Notice::Interrupted,
            }),
            Self::Cancelled { .. } => Some(Notice::Cancelled),
        }
    }
}

impl Display for ControllerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => f.write_str("the input is empty"),
            Self::RequestRejected(kind, message) => write!(f, "{kind}: {message}"),
            Self::StreamInterrupted { kind, partial } => write!(
                f,
                "{kind} after {} bytes of output",
                partial.len()
            ),
            Self::Cancelled { .. } => f.write_str("cancelled"),
        }
    }
}

impl StdError for ControllerError {}

/// Aborts the in-flight response of a controller.
///
/// Cancelling while the controller is idle has no effect on later
/// submissions.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation.
    ///
    /// The network read stops and the connection is released as soon as
    /// the controller observes this.
    #[inline]
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Orchestrates request/response cycles for one feature instance.
///
/// The controller owns the transcript. Submissions take `&mut self`, so
/// there is never more than one request in flight and deltas of two
/// responses can never interleave.
pub struct ConversationController {
    client: CompletionClient,
    system_prompt: Option<String>,
    context: Map<String, Value>,
    session: SessionContext,
    response_timeout: Duration,
    transcript: Transcript,
    state: ControllerState,
    cancel_tx: Arc<watch::Sender<bool>>,
    on_update: Option<UpdateFn>,
    on_delta: Option<DeltaFn>,
    on_state_change: Option<StateChangeFn>,
}

enum StreamEnd {
    Finished,
    EndedEarly,
    Failed(Box<dyn CompletionProviderError>),
    Cancelled,
}

impl ConversationController {
    /// Submits user input and drives the response to its end.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future stops the response. Whatever text
    /// arrived stays in the transcript and the next submission starts
    /// from [`ControllerState::Idle`].
    pub async fn submit<S: Into<String>>(
        &mut self,
        input: S,
    ) -> Result<Completion, ControllerError> {
        let input = input.into();
        if input.trim().is_empty() {
            return Err(ControllerError::EmptyInput);
        }
        if self.state != ControllerState::Idle {
            warn!("previous submission was abandoned while {:?}", self.state);
            self.set_state(ControllerState::Idle);
        }

        self.cancel_tx.send_replace(false);
        let mut cancel_rx = self.cancel_tx.subscribe();

        let user_index = self.transcript.push_user(input);
        self.notify_update();

        let request = self.build_request();
        self.set_state(ControllerState::Sending);
        let result = self.run(user_index, request, &mut cancel_rx).await;
        self.set_state(ControllerState::Idle);

        match &result {
            Ok(completion) => debug!(
                "response finished with {} bytes",
                completion.content.len()
            ),
            Err(err) => info!("response failed: {err}"),
        }
        result
    }

    async fn run(
        &mut self,
        user_index: usize,
        request: CompletionRequest,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<Completion, ControllerError> {
        let sent = tokio::select! {
            biased;
            _ = cancelled(cancel_rx) => None,
            res = timeout(
                self.response_timeout,
                self.client.send_request(request),
            ) => Some(res),
        };
        let mut stream = match sent {
            None => {
                return Err(ControllerError::Cancelled {
                    partial: String::new(),
                });
            }
            Some(Err(_)) => {
                return Err(ControllerError::RequestRejected(
                    ErrorKind::TimedOut,
                    format!("no response within {:?}", self.response_timeout),
                ));
            }
            Some(Ok(Err(err))) => {
                return Err(ControllerError::RequestRejected(
                    err.kind(),
                    err.to_string(),
                ));
            }
            Some(Ok(Ok(stream))) => stream,
        };

        self.set_state(ControllerState::Streaming);
        let mut accumulator = MessageAccumulator::new(user_index);
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel_rx) => None,
                next = stream.next_frame() => Some(next),
            };
            let frame = match next {
                None => break StreamEnd::Cancelled,
                Some(Ok(Some(frame))) => frame,
                Some(Ok(None)) => break StreamEnd::EndedEarly,
                Some(Err(err)) => break StreamEnd::Failed(err),
            };
            trace!("got a frame: {frame:?}");

            if accumulator.apply(&mut self.transcript, &frame) {
                if let (Some(on_delta), Some(delta)) =
                    (&self.on_delta, frame.delta_text.as_deref())
                {
                    on_delta(delta);
                }
                self.notify_update();
            }
            if accumulator.is_finished() {
                break StreamEnd::Finished;
            }
        };
        // Releases the connection right away.
        drop(stream);

        let partial = accumulator.content(&self.transcript).to_owned();
        match end {
            StreamEnd::Finished => Ok(Completion {
                assistant_index: accumulator.assistant_index(),
                content: partial,
            }),
            StreamEnd::EndedEarly => {
                warn!("stream ended without a terminal frame");
                Err(ControllerError::StreamInterrupted {
                    kind: ErrorKind::Interrupted,
                    partial,
                })
            }
            StreamEnd::Failed(err) => {
                warn!("stream broke: {err}");
                Err(ControllerError::StreamInterrupted {
                    kind: err.kind(),
                    partial,
                })
            }
            StreamEnd::Cancelled => Err(ControllerError::Cancelled { partial }),
        }
    }

    /// Returns a handle that cancels the in-flight response.
    #[inline]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the current phase.
    #[inline]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Returns the session requests are made with.
    #[inline]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Returns the session for modification, e.g. after signing in.
    #[inline]
    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    /// Clears the transcript.
    pub fn reset(&mut self) {
        if self.state != ControllerState::Idle {
            warn!("reset while {:?}", self.state);
            self.set_state(ControllerState::Idle);
        }
        self.transcript.clear();
        self.notify_update();
    }

    /// Saves the session to `store` and discards the conversation.
    pub async fn unmount(
        self,
        store: &dyn SessionStore,
    ) -> Result<SessionContext, SessionError> {
        store.save(&self.session).await?;
        debug!("unmounted with {} messages", self.transcript.len());
        Ok(self.session)
    }

    fn build_request(&self) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            messages: self.transcript.to_chat_messages(),
            context: self.context.clone(),
            bearer_token: self.session.access_token.clone(),
        }
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state == state {
            return;
        }
        trace!("state {:?} -> {state:?}", self.state);
        self.state = state;
        if let Some(on_state_change) = &self.on_state_change {
            on_state_change(state);
        }
    }

    #[inline]
    fn notify_update(&self) {
        if let Some(on_update) = &self.on_update {
            on_update(&self.transcript);
        }
    }
}

impl Debug for ConversationController {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationController")
            .field("state", &self.state)
            .field("messages", &self.transcript.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Resolves once cancellation is requested.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let result = rx.wait_for(|cancelled| *cancelled).await.map(|_| ());
    if result.is_err() {
        // The sender lives as long as the controller.
        pending::<()>().await;
    }
}
