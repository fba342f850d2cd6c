use serde::{Deserialize, Serialize};
use zyquence_model::ErrorKind;

/// A frame in a scripted response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ScriptedFrame {
    #[serde(rename = "delta")]
    Delta(String),
    #[serde(rename = "done")]
    Done,
}

/// How the provider answers one user turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptedResponse {
    /// Frames in this response, delivered in order.
    pub frames: Vec<ScriptedFrame>,
    /// If set, the request fails with this kind before any frame.
    pub rejection: Option<ErrorKind>,
    /// If set, the stream fails with [`ErrorKind::Interrupted`] after this
    /// many frames.
    pub interrupt_after: Option<usize>,
    /// If set, the stream never ends once its frames are delivered.
    pub stall: bool,
}

impl ScriptedResponse {
    /// Creates a response that streams `deltas` and then the terminal
    /// frame.
    #[inline]
    pub fn with_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frames: Vec<_> = deltas
            .into_iter()
            .map(|d| ScriptedFrame::Delta(d.into()))
            .collect();
        frames.push(ScriptedFrame::Done);
        Self {
            frames,
            ..Default::default()
        }
    }

    /// Creates a response whose request is refused.
    #[inline]
    pub fn rejected(kind: ErrorKind) -> Self {
        Self {
            rejection: Some(kind),
            ..Default::default()
        }
    }

    /// Drops the terminal frame, so the stream just ends.
    #[inline]
    pub fn without_done(mut self) -> Self {
        self.frames.retain(|f| *f != ScriptedFrame::Done);
        self
    }

    /// Breaks the stream after `frames` frames.
    #[inline]
    pub fn interrupted_after(mut self, frames: usize) -> Self {
        self.interrupt_after = Some(frames);
        self
    }

    /// Keeps the stream open forever after its frames.
    #[inline]
    pub fn stalled(mut self) -> Self {
        self.frames.retain(|f| *f != ScriptedFrame::Done);
        self.stall = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = ScriptedResponse::with_deltas(["Hel", "lo"])
            .interrupted_after(1);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: ScriptedResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
        assert_eq!(
            serde_json::to_value(&response.frames[0]).unwrap(),
            serde_json::json!({ "type": "delta", "data": "Hel" })
        );
    }

    #[test]
    fn test_builders() {
        let response = ScriptedResponse::with_deltas(["a"]).without_done();
        assert_eq!(response.frames, vec![ScriptedFrame::Delta("a".into())]);

        let response = ScriptedResponse::with_deltas(["a"]).stalled();
        assert!(response.stall);
        assert_eq!(response.frames.len(), 1);
    }
}
