use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::watch;
use zyquence_model::CompletionProvider;

use super::handle::{ConversationHandle, IdleFn, NoticeFn};
use super::{
    ControllerState, ConversationController, DeltaFn, StateChangeFn, UpdateFn,
};
use crate::completion_client::CompletionClient;
use crate::notice::Notice;
use crate::session::SessionContext;
use crate::transcript::Transcript;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ConversationController`] builder.
pub struct ConversationBuilder {
    client: CompletionClient,
    system_prompt: Option<String>,
    context: Map<String, Value>,
    session: SessionContext,
    response_timeout: Duration,
    on_update: Option<UpdateFn>,
    on_delta: Option<DeltaFn>,
    on_state_change: Option<StateChangeFn>,
    on_notice: Option<NoticeFn>,
    on_idle: Option<IdleFn>,
}

impl ConversationBuilder {
    /// Creates a new builder with the specified completion provider.
    #[inline]
    pub fn with_provider<P: CompletionProvider + 'static>(provider: P) -> Self {
        Self {
            client: CompletionClient::new(provider),
            system_prompt: None,
            context: Map::new(),
            session: SessionContext::default(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            on_update: None,
            on_delta: None,
            on_state_change: None,
            on_notice: None,
            on_idle: None,
        }
    }

    /// Sets the instructions placed ahead of every conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Adds a feature-specific field sent with every request.
    #[inline]
    pub fn with_context_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the session whose credentials authenticate requests.
    #[inline]
    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    /// Sets how long to wait for the response to be accepted.
    ///
    /// Defaults to 30 seconds. Silence during streaming is bounded by the
    /// provider instead.
    #[inline]
    pub fn with_response_timeout(mut self, duration: Duration) -> Self {
        self.response_timeout = duration;
        self
    }

    /// Attaches a callback invoked after every transcript change.
    #[inline]
    pub fn on_update(
        mut self,
        on_update: impl Fn(&Transcript) + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(on_update));
        self
    }

    /// Attaches a callback invoked with every piece of assistant text.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_delta = Some(Box::new(on_delta));
        self
    }

    /// Attaches a callback invoked when the controller changes phase.
    #[inline]
    pub fn on_state_change(
        mut self,
        on_state_change: impl Fn(ControllerState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Box::new(on_state_change));
        self
    }

    /// Attaches a callback invoked with the notice of a failed response.
    ///
    /// Only used by spawned conversations.
    #[inline]
    pub fn on_notice(
        mut self,
        on_notice: impl Fn(Notice) + Send + Sync + 'static,
    ) -> Self {
        self.on_notice = Some(Box::new(on_notice));
        self
    }

    /// Attaches a callback invoked when no submission is left to process.
    ///
    /// Only used by spawned conversations.
    #[inline]
    pub fn on_idle(mut self, on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds a controller driven by the caller.
    pub fn build(self) -> ConversationController {
        self.split().0
    }

    /// Spawns the controller on a tokio task and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(self) -> ConversationHandle {
        let (controller, on_notice, on_idle) = self.split();
        ConversationHandle::spawn(controller, on_notice, on_idle)
    }

    fn split(self) -> (ConversationController, Option<NoticeFn>, Option<IdleFn>) {
        let Self {
            client,
            system_prompt,
            context,
            session,
            response_timeout,
            on_update,
            on_delta,
            on_state_change,
            on_notice,
            on_idle,
        } = self;

        let (cancel_tx, _) = watch::channel(false);
        let controller = ConversationController {
            client,
            system_prompt,
            context,
            session,
            response_timeout,
            transcript: Transcript::new(),
            state: ControllerState::Idle,
            cancel_tx: Arc::new(cancel_tx),
            on_update,
            on_delta,
            on_state_change,
        };
        (controller, on_notice, on_idle)
    }
}
