use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zyquence_model::{ChatMessage, CompletionRequest, Role};

use crate::GatewayConfig;

/// Body fields owned by the gateway protocol. Context entries with these
/// names are dropped instead of overwriting them.
const RESERVED_FIELDS: [&str; 3] = ["messages", "model", "stream"];

// ------------------------------
// Types received from the server
// ------------------------------

/// An OpenAI-style streaming chunk. Every field is optional, payloads
/// that lack them are simply frames without content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Extracts `choices[0].delta.content` from a decoded payload.
///
/// Returns `None` for role announcements, keep-alives, empty deltas and
/// payloads of an unexpected shape.
pub fn delta_text(payload: Value) -> Option<String> {
    let chunk = match serde_json::from_value::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            debug!("ignoring payload of unexpected shape: {err}");
            return None;
        }
    };
    let choice = chunk.choices.into_iter().next()?;
    if let Some(finish_reason) = &choice.finish_reason {
        trace!("finish reason: {finish_reason}");
    }
    choice
        .delta?
        .content
        .filter(|content| !content.is_empty())
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(flatten)]
    context: Map<String, Value>,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &CompletionRequest,
    config: &GatewayConfig,
    stream: bool,
) -> ChatCompletionRequest {
    let system = req
        .system_prompt
        .as_ref()
        .map(|prompt| ChatMessage::new(Role::System, prompt.clone()));
    let messages = system
        .into_iter()
        .chain(req.messages.iter().cloned())
        .collect();

    let mut context = req.context.clone();
    for field in RESERVED_FIELDS {
        if context.remove(field).is_some() {
            warn!("context field `{field}` is reserved, dropped");
        }
    }

    ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        stream,
        context,
    }
}
