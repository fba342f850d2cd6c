use std::io::Write;

use zyquence::Assistant;
use zyquence::core::{
    Completion, ControllerError, ControllerState, ConversationBuilder,
};
use zyquence::gateway::{GatewayConfigBuilder, GatewayProvider};
use zyquence_model::{ErrorKind, Role};

const FIRST_CHUNK: &[u8] =
    b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: {\"choi";
const SECOND_CHUNK: &[u8] =
    b"ces\":[{\"delta\":{\"content\":\" there\"}}]}\ndata: [DONE]\n";

fn provider_for(server: &mockito::Server) -> GatewayProvider {
    let config = GatewayConfigBuilder::with_token("test-token")
        .with_endpoint(format!("{}/chat", server.url()))
        .build();
    GatewayProvider::new(config).unwrap()
}

/// Serves `chunks` as one chunked event stream, flushing after each.
async fn mock_stream(
    server: &mut mockito::Server,
    chunks: Vec<Vec<u8>>,
) -> mockito::Mock {
    server
        .mock("POST", "/chat")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(move |w| {
            for chunk in &chunks {
                w.write_all(chunk)?;
                w.flush()?;
            }
            Ok(())
        })
        .create_async()
        .await
}

fn transcript_of(
    controller: &zyquence::core::ConversationController,
) -> Vec<(Role, String)> {
    controller
        .transcript()
        .messages()
        .iter()
        .map(|msg| (msg.role(), msg.content().to_owned()))
        .collect()
}

#[tokio::test]
async fn test_chat_over_split_event_stream() {
    let mut server = mockito::Server::new_async().await;
    let mock = mock_stream(
        &mut server,
        vec![FIRST_CHUNK.to_vec(), SECOND_CHUNK.to_vec()],
    )
    .await;

    let mut controller =
        ConversationBuilder::with_provider(provider_for(&server)).build();
    let completion = controller.submit("Hello").await.unwrap();

    assert_eq!(
        completion,
        Completion {
            assistant_index: Some(1),
            content: "Hi there".to_owned(),
        }
    );
    assert_eq!(
        transcript_of(&controller),
        vec![
            (Role::User, "Hello".to_owned()),
            (Role::Assistant, "Hi there".to_owned()),
        ]
    );
    assert_eq!(controller.state(), ControllerState::Idle);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_chat_over_single_byte_chunks() {
    let mut server = mockito::Server::new_async().await;
    let chunks = [FIRST_CHUNK, SECOND_CHUNK]
        .concat()
        .into_iter()
        .map(|byte| vec![byte])
        .collect();
    let mock = mock_stream(&mut server, chunks).await;

    let mut controller = Assistant::AtlasChat
        .builder(provider_for(&server))
        .build();
    let completion = controller.submit("Hello").await.unwrap();

    assert_eq!(completion.content, "Hi there");
    assert_eq!(completion.assistant_index, Some(1));
    assert_eq!(controller.transcript().len(), 2);
    assert_eq!(controller.state(), ControllerState::Idle);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_truncated_stream_keeps_partial_reply() {
    let mut server = mockito::Server::new_async().await;
    let chunks = vec![
        b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n".to_vec(),
        b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n".to_vec(),
    ];
    let mock = mock_stream(&mut server, chunks).await;

    let mut controller =
        ConversationBuilder::with_provider(provider_for(&server)).build();
    let err = controller.submit("Hello").await.unwrap_err();

    assert_eq!(
        err,
        ControllerError::StreamInterrupted {
            kind: ErrorKind::Interrupted,
            partial: "Hello".to_owned(),
        }
    );
    assert_eq!(
        transcript_of(&controller),
        vec![
            (Role::User, "Hello".to_owned()),
            (Role::Assistant, "Hello".to_owned()),
        ]
    );
    assert_eq!(controller.state(), ControllerState::Idle);
    mock.assert_async().await;
}
