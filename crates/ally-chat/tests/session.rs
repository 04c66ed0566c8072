use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use ally_chat::{
    CancellationToken, ChatError, ChatSession, ChatSupportRequest, ChatTransport,
    FALLBACK_REPLY, QUICK_REPLIES, Role, SequentialIds, SseReader, StreamError, TurnOutcome,
    TurnState,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::mpsc;

/// What the next call to `open` does
enum Reply {
    Chunks(Vec<&'static str>),
    ChunksThenReset(Vec<&'static str>),
    Refused,
    Channel(mpsc::UnboundedReceiver<Bytes>),
    Silent,
}

#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatSupportRequest>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        }
    }

    fn requests(&self) -> Vec<ChatSupportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn chunks(items: Vec<&'static str>) -> Vec<Result<Bytes, StreamError>> {
    items.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect()
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: &ChatSupportRequest) -> Result<SseReader, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");

        match reply {
            Reply::Chunks(items) => Ok(SseReader::from_stream(stream::iter(chunks(items)))),
            Reply::ChunksThenReset(items) => {
                let mut items = chunks(items);
                items.push(Err(StreamError::Transport("connection reset".into())));
                Ok(SseReader::from_stream(stream::iter(items)))
            }
            Reply::Refused => Err(StreamError::Api {
                status: 500,
                message: "edge function crashed".into(),
            }
            .into()),
            Reply::Channel(rx) => Ok(SseReader::from_stream(stream::unfold(
                rx,
                |mut rx| async move { rx.recv().await.map(|bytes| (Ok(bytes), rx)) },
            ))),
            Reply::Silent => Ok(SseReader::from_stream(stream::pending())),
        }
    }
}

fn session(replies: Vec<Reply>) -> (Arc<ChatSession<Arc<ScriptedTransport>>>, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(replies));
    let session = ChatSession::with_ids(transport.clone(), SequentialIds::new());
    (Arc::new(session), transport)
}

const HELLO: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n";
const WORLD: &str = "data: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\n\n";
const DONE: &str = "data: [DONE]\n\n";

#[tokio::test]
async fn completed_turn_concatenates_deltas() {
    let (session, transport) = session(vec![Reply::Chunks(vec![
        ": stream opened\n\n",
        HELLO,
        WORLD,
        DONE,
    ])]);

    let reply = match session.submit("  Hi there  ").await {
        TurnOutcome::Completed(reply) => reply,
        other => panic!("expected a completed turn, got {other:?}"),
    };
    assert_eq!(reply.content, "Hello, world");
    assert_eq!(reply.role, Role::Assistant);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, TurnState::Idle);
    assert!(!snapshot.has_error);
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].content, "Hi there");
    assert_eq!(snapshot.messages[0].id.as_str(), "msg-1");
    assert_eq!(snapshot.messages[1], reply);
    assert_eq!(snapshot.messages[1].id.as_str(), "msg-2");

    // The placeholder is not part of the history sent upstream
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[0].messages[0].content, "Hi there");
}

#[tokio::test]
async fn two_frames_in_one_chunk_apply_in_order() {
    let (session, _) = session(vec![Reply::Chunks(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
    ])]);

    assert!(matches!(session.submit("go").await, TurnOutcome::Completed(m) if m.content == "AB"));
}

#[tokio::test]
async fn done_only_stream_leaves_empty_reply() {
    let (session, _) = session(vec![Reply::Chunks(vec!["data: [DONE]\n"])]);

    assert!(matches!(session.submit("ping").await, TurnOutcome::Completed(m) if m.content.is_empty()));
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, TurnState::Idle);
    assert!(!snapshot.has_error);
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[1].content, "");
}

#[tokio::test]
async fn unterminated_final_frame_is_flushed() {
    let (session, _) = session(vec![Reply::Chunks(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}",
    ])]);

    assert!(matches!(session.submit("hey").await, TurnOutcome::Completed(m) if m.content == "hi"));
}

#[tokio::test]
async fn refused_request_shows_single_fallback() {
    let (session, _) = session(vec![Reply::Refused]);

    let outcome = session.submit("Is my nitrate too high?").await;
    match outcome {
        TurnOutcome::Failed(error) => assert_eq!(error.status(), Some(500)),
        other => panic!("expected failure, got {other:?}"),
    }

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, TurnState::Failed);
    assert!(snapshot.has_error);
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.messages[0].is_user());
    assert_eq!(snapshot.messages[1].content, FALLBACK_REPLY);
    assert_eq!(
        snapshot
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count(),
        1
    );
}

#[tokio::test]
async fn mid_stream_failure_discards_partial_reply() {
    let (session, _) = session(vec![Reply::ChunksThenReset(vec![HELLO])]);

    assert!(matches!(
        session.submit("hello?").await,
        TurnOutcome::Failed(ChatError::Stream(StreamError::Transport(_)))
    ));

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, FALLBACK_REPLY);
    assert_eq!(messages[1].id.as_str(), "msg-3");
}

#[tokio::test]
async fn resubmitting_after_failure_recovers() {
    let (session, transport) = session(vec![
        Reply::Refused,
        Reply::Chunks(vec![HELLO, DONE]),
    ]);

    assert!(matches!(session.submit("first").await, TurnOutcome::Failed(_)));
    assert!(session.has_error().await);

    assert!(matches!(session.submit("again").await, TurnOutcome::Completed(_)));
    assert!(!session.has_error().await);
    assert_eq!(session.state().await, TurnState::Idle);

    let requests = transport.requests();
    let sent: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(sent, vec!["first", FALLBACK_REPLY, "again"]);
}

#[tokio::test]
async fn submissions_while_streaming_are_ignored() {
    let (tx, rx) = mpsc::unbounded_channel();
    let (session, transport) = session(vec![Reply::Channel(rx)]);

    let mut updates = session.subscribe();
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.submit("first").await }
    });

    updates
        .wait_for(|s| s.state == TurnState::Streaming)
        .await
        .unwrap();

    assert!(matches!(session.submit("second").await, TurnOutcome::Ignored));
    assert!(!session.clear().await);

    tx.send(Bytes::from_static(HELLO.as_bytes())).unwrap();
    tx.send(Bytes::from_static(DONE.as_bytes())).unwrap();
    drop(tx);

    assert!(matches!(running.await.unwrap(), TurnOutcome::Completed(m) if m.content == "Hello"));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(session.messages().await.len(), 2);
}

#[tokio::test]
async fn cancellation_keeps_partial_reply() {
    let (tx, rx) = mpsc::unbounded_channel();
    let (session, _) = session(vec![Reply::Channel(rx)]);
    let token = CancellationToken::new();

    let mut updates = session.subscribe();
    let running = tokio::spawn({
        let session = session.clone();
        let token = token.clone();
        async move { session.submit_with_cancel("tell me", token).await }
    });

    tx.send(Bytes::from_static(HELLO.as_bytes())).unwrap();
    updates
        .wait_for(|s| s.messages.last().is_some_and(|m| m.content == "Hello"))
        .await
        .unwrap();
    token.cancel();

    assert!(matches!(running.await.unwrap(), TurnOutcome::Cancelled(m) if m.content == "Hello"));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, TurnState::Idle);
    assert!(!snapshot.has_error);
    assert_eq!(snapshot.messages[1].content, "Hello");
    drop(tx);
}

#[tokio::test]
async fn timed_out_turn_releases_the_session() {
    let (session, transport) = session(vec![Reply::Silent, Reply::Chunks(vec![HELLO, DONE])]);

    let timed_out = tokio::time::timeout(Duration::from_millis(50), session.submit("hi")).await;
    assert!(timed_out.is_err());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, TurnState::Idle);
    assert!(!snapshot.has_error);
    // The empty placeholder goes away, the user message stays
    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.messages[0].is_user());

    assert!(matches!(session.submit("retry").await, TurnOutcome::Completed(m) if m.content == "Hello"));
    assert_eq!(transport.requests().len(), 2);
    assert!(session.clear().await);
}

#[tokio::test]
async fn aborted_turn_keeps_partial_reply() {
    let (tx, rx) = mpsc::unbounded_channel();
    let (session, _) = session(vec![Reply::Channel(rx)]);

    let mut updates = session.subscribe();
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.submit("tell me").await }
    });

    tx.send(Bytes::from_static(HELLO.as_bytes())).unwrap();
    updates
        .wait_for(|s| s.messages.last().is_some_and(|m| m.content == "Hello"))
        .await
        .unwrap();

    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());

    let snapshot = updates
        .wait_for(|s| s.state == TurnState::Idle)
        .await
        .unwrap()
        .clone();
    assert!(!snapshot.has_error);
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[1].content, "Hello");
    assert!(!session.shows_quick_replies().await);
    drop(tx);
}

#[tokio::test]
async fn blank_input_and_unknown_quick_reply_are_ignored() {
    let (session, transport) = session(vec![]);

    assert!(matches!(session.submit("   ").await, TurnOutcome::Ignored));
    assert!(matches!(
        session.submit_quick_reply(QUICK_REPLIES.len()).await,
        TurnOutcome::Ignored
    ));
    assert!(session.shows_quick_replies().await);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn quick_reply_submits_its_text() {
    let (session, transport) = session(vec![Reply::Chunks(vec![HELLO, DONE])]);

    assert!(matches!(session.submit_quick_reply(1).await, TurnOutcome::Completed(_)));
    assert_eq!(transport.requests()[0].messages[0].content, QUICK_REPLIES[1]);
    assert!(!session.shows_quick_replies().await);

    assert!(session.clear().await);
    assert!(session.shows_quick_replies().await);
}
