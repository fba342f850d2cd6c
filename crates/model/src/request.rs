use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions. Only used on the wire.
    System,
    /// A person typing into the feature.
    User,
    /// The completion backend.
    Assistant,
}

/// A complete message sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a new message.
    #[inline]
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A request to be sent to the completion provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Instructions placed ahead of the conversation.
    pub system_prompt: Option<String>,
    /// The conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Feature-specific fields sent alongside the messages.
    pub context: Map<String, Value>,
    /// Credentials for this request.
    ///
    /// When set, this takes precedence over whatever token the provider
    /// was configured with.
    pub bearer_token: Option<String>,
}
