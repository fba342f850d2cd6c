//! Conversation-related types.

use serde::{Deserialize, Serialize};
use zyquence_model::{ChatMessage, Role};

/// One turn in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Returns who wrote this message.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text of this message.
    ///
    /// For an assistant message that is still streaming, this is the text
    /// received so far.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// The ordered turns of one feature's conversation.
///
/// A transcript only ever holds user and assistant messages, in the
/// order they were added. Assistant content is written exclusively by a
/// [`MessageAccumulator`](crate::MessageAccumulator).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user message and returns its index.
    #[inline]
    pub fn push_user<S: Into<String>>(&mut self, content: S) -> usize {
        self.messages.push(Message {
            role: Role::User,
            content: content.into(),
        });
        self.messages.len() - 1
    }

    /// Returns all messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the message at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Returns the most recent message.
    #[inline]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Discards every message.
    #[inline]
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Converts the transcript into the message list of a request.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|msg| ChatMessage::new(msg.role, msg.content.clone()))
            .collect()
    }

    pub(crate) fn insert_assistant(&mut self, index: usize, content: &str) {
        self.messages.insert(
            index,
            Message {
                role: Role::Assistant,
                content: content.to_owned(),
            },
        );
    }

    pub(crate) fn append_to(&mut self, index: usize, delta: &str) {
        let Some(msg) = self.messages.get_mut(index) else {
            error!("no message at {index} to append to");
            return;
        };
        debug_assert_eq!(msg.role, Role::Assistant);
        msg.content.push_str(delta);
    }
}
