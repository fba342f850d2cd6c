use zyquence_model::StreamFrame;

use crate::transcript::Transcript;

/// Folds the frames of one response into a transcript.
///
/// The assistant message is created lazily, right after the user message
/// that triggered the response, when the first non-empty delta arrives.
/// Every later delta is appended to it in arrival order. Nothing is ever
/// truncated, so the final content is exactly the concatenation of all
/// deltas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageAccumulator {
    user_index: usize,
    assistant_index: Option<usize>,
    finished: bool,
}

impl MessageAccumulator {
    /// Creates an accumulator for the response to the user message at
    /// `user_index`.
    #[inline]
    pub fn new(user_index: usize) -> Self {
        Self {
            user_index,
            assistant_index: None,
            finished: false,
        }
    }

    /// Applies one frame, returns `true` if the transcript changed.
    ///
    /// Frames arriving after [`finish`](Self::finish) or after a terminal
    /// frame are ignored.
    pub fn apply(
        &mut self,
        transcript: &mut Transcript,
        frame: &StreamFrame,
    ) -> bool {
        if self.finished {
            trace!("frame after finish ignored");
            return false;
        }

        let delta = frame.delta_text.as_deref().filter(|d| !d.is_empty());
        let changed = match (delta, self.assistant_index) {
            (None, _) => false,
            (Some(delta), None) => {
                let index = self.user_index + 1;
                transcript.insert_assistant(index, delta);
                self.assistant_index = Some(index);
                true
            }
            (Some(delta), Some(index)) => {
                transcript.append_to(index, delta);
                true
            }
        };

        if frame.terminal {
            self.finish();
        }
        changed
    }

    /// Marks the response as complete.
    #[inline]
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Returns `true` once no further mutation will happen.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns where the assistant message lives, if it was created.
    #[inline]
    pub fn assistant_index(&self) -> Option<usize> {
        self.assistant_index
    }

    /// Returns the text accumulated so far.
    #[inline]
    pub fn content<'a>(&self, transcript: &'a Transcript) -> &'a str {
        self.assistant_index
            .and_then(|index| transcript.get(index))
            .map(|msg| msg.content())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use zyquence_model::Role;

    use super::*;

    fn replay(deltas: &[String]) -> Transcript {
        let mut transcript = Transcript::new();
        let user_index = transcript.push_user("question");
        let mut accumulator = MessageAccumulator::new(user_index);
        for delta in deltas {
            accumulator.apply(&mut transcript, &StreamFrame::delta(delta.clone()));
        }
        accumulator.apply(&mut transcript, &StreamFrame::terminal());
        transcript
    }

    #[test]
    fn test_creates_then_appends() {
        let mut transcript = Transcript::new();
        let user_index = transcript.push_user("Hi");
        let mut accumulator = MessageAccumulator::new(user_index);

        assert!(accumulator.apply(&mut transcript, &StreamFrame::delta("Hel")));
        assert_eq!(accumulator.assistant_index(), Some(1));
        assert!(accumulator.apply(&mut transcript, &StreamFrame::delta("lo")));
        assert_eq!(transcript.len(), 2);

        let msg = transcript.get(1).unwrap();
        assert_eq!(msg.role(), Role::Assistant);
        assert_eq!(msg.content(), "Hello");
        assert_eq!(accumulator.content(&transcript), "Hello");
    }

    #[test]
    fn test_no_content_frames_are_silent() {
        let mut transcript = Transcript::new();
        let user_index = transcript.push_user("Hi");
        let mut accumulator = MessageAccumulator::new(user_index);

        let empty = StreamFrame {
            delta_text: None,
            terminal: false,
        };
        assert!(!accumulator.apply(&mut transcript, &empty));
        assert!(!accumulator.apply(&mut transcript, &StreamFrame::delta("")));
        assert_eq!(transcript.len(), 1);
        assert_eq!(accumulator.assistant_index(), None);
        assert_eq!(accumulator.content(&transcript), "");
    }

    #[test]
    fn test_terminal_finishes() {
        let mut transcript = Transcript::new();
        let user_index = transcript.push_user("Hi");
        let mut accumulator = MessageAccumulator::new(user_index);

        accumulator.apply(&mut transcript, &StreamFrame::delta("Done."));
        assert!(!accumulator.apply(&mut transcript, &StreamFrame::terminal()));
        assert!(accumulator.is_finished());
        assert!(!accumulator.apply(&mut transcript, &StreamFrame::delta("late")));
        assert_eq!(accumulator.content(&transcript), "Done.");
    }

    #[test]
    fn test_inserts_after_its_user_message() {
        let mut transcript = Transcript::new();
        let first = transcript.push_user("first");
        transcript.push_user("second");
        let mut accumulator = MessageAccumulator::new(first);
        accumulator.apply(&mut transcript, &StreamFrame::delta("reply"));

        let contents: Vec<_> =
            transcript.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, ["first", "reply", "second"]);
    }

    proptest! {
        #[test]
        fn prop_replay_is_deterministic(
            deltas in prop::collection::vec(".{0,8}", 0..24),
        ) {
            let first = replay(&deltas);
            let second = replay(&deltas);
            prop_assert_eq!(&first, &second);

            let expected: String = deltas.concat();
            let content = first.get(1).map(|m| m.content()).unwrap_or_default();
            prop_assert_eq!(content, expected.as_str());
            prop_assert_eq!(first.len(), if expected.is_empty() { 1 } else { 2 });
        }
    }
}
