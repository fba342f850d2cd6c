use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use zyquence_model::{CompletionStream, ErrorKind, StreamFrame};

use crate::Error;
use crate::io::{Sse, SseError, SseEvent};
use crate::proto;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFrame = Result<(Option<StreamFrame>, Sse), Error>;

pin_project! {
    /// The frame stream of one streaming request.
    ///
    /// Dropping it drops the response body, which aborts the read and
    /// releases the connection.
    pub struct GatewayStream {
        next_frame_fut: Option<PinnedFuture<NextFrame>>,
    }
}

impl GatewayStream {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        Self {
            next_frame_fut: Some(Box::pin(next_frame(sse))),
        }
    }
}

impl CompletionStream for GatewayStream {
    type Error = crate::Error;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>> {
        let this = self.project();
        let Some(next_frame_fut) = this.next_frame_fut else {
            // The stream has been exhausted.
            return Poll::Ready(Ok(None));
        };
        let (frame, sse) = match ready!(next_frame_fut.as_mut().poll(cx)) {
            Ok((Some(frame), sse)) => (frame, sse),
            Ok((None, _)) => {
                *this.next_frame_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_frame_fut = None;
                return Poll::Ready(Err(err));
            }
        };
        if frame.terminal {
            // Nothing may follow the terminal frame.
            *this.next_frame_fut = None;
        } else {
            // The stream may still have more data to pull, create a new
            // future for the next frame.
            *this.next_frame_fut = Some(Box::pin(next_frame(sse)));
        }

        Poll::Ready(Ok(Some(frame)))
    }
}

async fn next_frame(mut sse: Sse) -> NextFrame {
    loop {
        let event = match sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok((None, sse)),
            Err(err) => return Err(stream_error(err)),
        };
        let payload = match event {
            SseEvent::Done => return Ok((Some(StreamFrame::terminal()), sse)),
            SseEvent::Data(payload) => payload,
        };
        trace!("got payload: {payload}");
        if let Some(text) = proto::delta_text(payload) {
            return Ok((Some(StreamFrame::delta(text)), sse));
        }
    }
}

#[inline]
fn stream_error(err: SseError) -> Error {
    match err {
        SseError::ChunksError(err) => Error::new(
            format!("failed to read the response: {}", err.message),
            ErrorKind::Interrupted,
        ),
        SseError::Overflow => Error::new(
            "response buffered too much data without a complete line",
            ErrorKind::Interrupted,
        ),
        SseError::TimedOut => {
            Error::new("response stalled", ErrorKind::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;
    use std::time::Duration;

    use bytes::Bytes;
    use proptest::prelude::*;
    use zyquence_model::CompletionProviderError;

    use super::*;
    use crate::io::{Chunks, ChunksError, SseLimits};

    const LIMITS: SseLimits = SseLimits {
        idle_timeout: Duration::from_secs(5),
        max_buffered_bytes: 64 * 1024,
    };

    const TWO_CHUNK_EXAMPLE: [&str; 2] = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: {\"choi",
        "ces\":[{\"delta\":{\"content\":\" there\"}}]}\ndata: [DONE]\n",
    ];

    fn stream_of(chunks: Vec<Bytes>) -> GatewayStream {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()), LIMITS);
        GatewayStream::from_sse(sse)
    }

    /// Collects every frame until the stream ends or fails.
    async fn collect_frames(
        stream: GatewayStream,
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

    fn concat(frames: &[StreamFrame]) -> String {
        frames
            .iter()
            .filter_map(|f| f.delta_text.as_deref())
            .collect()
    }

    fn delta_line(text: &str) -> String {
        let payload = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "delta": { "content": text } }],
        });
        format!("data: {payload}\n")
    }

    #[tokio::test]
    async fn test_two_chunk_example() {
        let stream = stream_of(
            TWO_CHUNK_EXAMPLE
                .into_iter()
                .map(|s| Bytes::from_static(s.as_bytes()))
                .collect(),
        );
        let (frames, err) = collect_frames(stream).await;
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                StreamFrame::delta("Hi"),
                StreamFrame::delta(" there"),
                StreamFrame::terminal(),
            ]
        );
    }

    #[tokio::test]
    async fn test_role_frame_is_silent() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (frames, err) =
            collect_frames(stream_of(vec![Bytes::from_static(body.as_bytes())]))
                .await;
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![StreamFrame::delta("ok"), StreamFrame::terminal()]
        );
    }

    #[tokio::test]
    async fn test_done_halts_processing() {
        let body = format!(
            "{}data: [DONE]\n{}data: {{broken\n",
            delta_line("a"),
            delta_line("b")
        );
        let stream = stream_of(vec![Bytes::from(body)]);
        let (frames, err) = collect_frames(stream).await;
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![StreamFrame::delta("a"), StreamFrame::terminal()]
        );
    }

    #[tokio::test]
    async fn test_split_payload_emits_exactly_one_frame() {
        let line = delta_line("whole");
        let (first, second) = line.split_at(line.len() / 2);
        let stream = stream_of(vec![
            Bytes::from(first.to_owned()),
            Bytes::from(second.to_owned()),
        ]);
        let (frames, err) = collect_frames(stream).await;
        assert!(err.is_none());
        assert_eq!(frames, vec![StreamFrame::delta("whole")]);
    }

    #[tokio::test]
    async fn test_read_error_keeps_delivered_frames() {
        let chunks = Chunks::from_results(
            vec![
                Ok(Bytes::from(delta_line("Hel") + &delta_line("lo"))),
                Err(ChunksError {
                    message: "connection reset".to_owned(),
                }),
            ]
            .into(),
        );
        let stream = GatewayStream::from_sse(Sse::new(chunks, LIMITS));
        let (frames, err) = collect_frames(stream).await;
        assert_eq!(concat(&frames), "Hello");
        assert_eq!(err.unwrap().kind(), ErrorKind::Interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let stream =
            GatewayStream::from_sse(Sse::new(Chunks::Silent, LIMITS));
        let (frames, err) = collect_frames(stream).await;
        assert!(frames.is_empty());
        assert_eq!(err.unwrap().kind(), ErrorKind::TimedOut);
    }

    fn run_blocking(chunks: Vec<Bytes>) -> Vec<StreamFrame> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let (frames, err) = runtime.block_on(collect_frames(stream_of(chunks)));
        assert!(err.is_none());
        frames
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_output(
            deltas in prop::collection::vec("[a-zA-Z0-9 é日👋\"\\\\]{1,12}", 1..8),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
        ) {
            let mut body = String::from(
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            );
            for delta in &deltas {
                body.push_str(&delta_line(delta));
                body.push('\n');
            }
            body.push_str("data: [DONE]\n\n");
            let bytes = body.into_bytes();

            // Cut at arbitrary byte offsets, including inside multi-byte
            // characters and JSON payloads.
            let mut offsets: Vec<usize> =
                cuts.iter().map(|i| i.index(bytes.len())).collect();
            offsets.sort_unstable();
            offsets.dedup();
            let mut chunks = vec![];
            let mut start = 0;
            for offset in offsets {
                chunks.push(Bytes::copy_from_slice(&bytes[start..offset]));
                start = offset;
            }
            chunks.push(Bytes::copy_from_slice(&bytes[start..]));

            let whole = run_blocking(vec![Bytes::from(bytes.clone())]);
            let split = run_blocking(chunks);
            let single_bytes = run_blocking(
                bytes.iter().map(|b| Bytes::copy_from_slice(&[*b])).collect(),
            );

            prop_assert_eq!(concat(&whole), deltas.concat());
            prop_assert_eq!(&split, &whole);
            prop_assert_eq!(&single_bytes, &whole);
            prop_assert_eq!(whole.last(), Some(&StreamFrame::terminal()));
        }
    }
}
