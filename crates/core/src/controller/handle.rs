use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::ConversationController;
use crate::notice::Notice;

pub(super) type NoticeFn = Box<dyn Fn(Notice) + Send + Sync>;
pub(super) type IdleFn = Box<dyn Fn() + Send + Sync>;

#[derive(Debug)]
enum Command {
    Submit(String),
    Cancel,
    Reset,
}

/// A conversation running on its own tokio task.
///
/// Commands are handled immediately, no matter what the conversation is
/// doing. A submission that arrives while a response is streaming is
/// queued and processed once the conversation becomes idle, in the order
/// submissions were made.
///
/// Dropping the handle cancels the active response, discards queued
/// submissions and stops the task.
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<ConversationController>,
}

impl ConversationHandle {
    pub(super) fn spawn(
        controller: ConversationController,
        on_notice: Option<NoticeFn>,
        on_idle: Option<IdleFn>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            controller,
            rx,
            queue: VecDeque::new(),
            closed: false,
            on_notice,
            on_idle,
        };
        let task =
            tokio::spawn(driver.run().instrument(trace_span!("conversation")));
        Self { tx, task }
    }

    /// Enqueues user input for processing.
    pub fn submit<S: Into<String>>(&self, input: S) {
        self.send(Command::Submit(input.into()));
    }

    /// Cancels the active response, if any.
    ///
    /// Queued submissions are kept.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    /// Cancels the active response, discards queued submissions and
    /// clears the transcript.
    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Stops the conversation and hands its controller back.
    ///
    /// Like dropping the handle, this cancels the active response and
    /// discards queued submissions. Returns `None` if the task panicked.
    pub async fn close(self) -> Option<ConversationController> {
        let Self { tx, task } = self;
        drop(tx);
        match task.await {
            Ok(controller) => Some(controller),
            Err(err) => {
                error!("conversation task failed: {err}");
                None
            }
        }
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("conversation task has stopped");
        }
    }
}

struct Driver {
    controller: ConversationController,
    rx: mpsc::UnboundedReceiver<Command>,
    queue: VecDeque<String>,
    closed: bool,
    on_notice: Option<NoticeFn>,
    on_idle: Option<IdleFn>,
}

impl Driver {
    async fn run(mut self) -> ConversationController {
        loop {
            if let Some(input) = self.queue.pop_front() {
                self.process(input).await;
                continue;
            }
            if self.closed {
                break;
            }
            match self.rx.recv().await {
                Some(Command::Submit(input)) => self.queue.push_back(input),
                Some(Command::Cancel) => trace!("nothing to cancel"),
                Some(Command::Reset) => self.controller.reset(),
                None => self.closed = true,
            }
        }
        trace!("conversation stopped");
        self.controller
    }

    async fn process(&mut self, input: String) {
        let Self {
            controller,
            rx,
            queue,
            closed,
            on_notice,
            on_idle,
        } = self;

        let cancel = controller.cancel_handle();
        let mut reset_requested = false;
        let result = {
            let submission = controller.submit(input);
            tokio::pin!(submission);
            loop {
                tokio::select! {
                    biased;
                    result = &mut submission => break result,
                    command = rx.recv(), if !*closed => match command {
                        Some(Command::Submit(input)) => {
                            debug!("queued behind the active response");
                            queue.push_back(input);
                        }
                        Some(Command::Cancel) => cancel.cancel(),
                        Some(Command::Reset) => {
                            queue.clear();
                            reset_requested = true;
                            cancel.cancel();
                        }
                        None => {
                            queue.clear();
                            *closed = true;
                            cancel.cancel();
                        }
                    },
                }
            }
        };

        if reset_requested {
            // A reset discards the response along with its notice.
            controller.reset();
        } else if let (Err(err), Some(on_notice)) = (&result, on_notice.as_ref())
        {
            if let Some(notice) = err.notice() {
                on_notice(notice);
            }
        }
        if queue.is_empty() && !*closed {
            // Nothing to process, so we can invoke the idle callback.
            if let Some(on_idle) = on_idle {
                on_idle();
            }
        }
    }
}
