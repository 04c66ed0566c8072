use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ChatError,
    ids::{IdGenerator, UuidIds},
    message::{ChatSupportRequest, Message, MessageId},
    quick_reply::quick_reply,
    reducer::{append_to_last, remove_last, replace_last},
    transport::ChatTransport,
};

/// Reply shown in place of the assistant message when a turn fails
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble connecting right now. Please try again in a moment.";

/// Where the conversation is in its current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming,
    Failed,
}

/// How a submission ended
#[derive(Debug)]
pub enum TurnOutcome {
    /// Empty input, unknown quick reply, or a turn was already streaming
    Ignored,
    /// The reply finished streaming
    Completed(Message),
    /// The cancellation token fired; the message holds what arrived before that
    Cancelled(Message),
    /// The transport failed and the fallback reply was shown
    Failed(ChatError),
}

/// Point-in-time view of a session, published after every change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub state: TurnState,
    pub has_error: bool,
}

struct Inner {
    messages: Vec<Message>,
    state: TurnState,
    has_error: bool,
    ids: Box<dyn IdGenerator>,
}

impl Inner {
    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.messages.clone(),
            state: self.state,
            has_error: self.has_error,
        }
    }
}

struct Shared {
    inner: RwLock<Inner>,
    updates: watch::Sender<ChatSnapshot>,
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.snapshot());
    }

    /// Settle a turn whose future went away before it finished
    fn abandon_turn(&self, inner: &mut Inner, placeholder: &MessageId) {
        if inner.state != TurnState::Streaming {
            return;
        }

        inner.state = TurnState::Idle;
        if inner
            .messages
            .last()
            .is_some_and(|m| &m.id == placeholder && m.content.is_empty())
        {
            inner.messages = remove_last(std::mem::take(&mut inner.messages));
        }
        self.publish(inner);
    }
}

/// Armed while a turn is streaming. Dropping it armed returns the session to `Idle`.
struct TurnGuard {
    shared: Arc<Shared>,
    placeholder: MessageId,
    armed: bool,
}

impl TurnGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!("turn dropped while streaming, releasing the session");

        if let Ok(mut inner) = self.shared.inner.try_write() {
            self.shared.abandon_turn(&mut inner, &self.placeholder);
            return;
        }

        // Someone holds the lock right now; finish the cleanup once they are done
        let shared = Arc::clone(&self.shared);
        let placeholder = self.placeholder.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut inner = shared.inner.write().await;
                    shared.abandon_turn(&mut inner, &placeholder);
                });
            }
            Err(_) => warn!("turn dropped outside a runtime, session left streaming"),
        }
    }
}

/// One support-chat conversation
///
/// Only one turn streams at a time; submissions made while a reply is streaming are
/// ignored. The message list is only ever changed through the functions in
/// [`crate::reducer`].
///
/// Dropping a submit future part-way (a timeout, a losing `select!` branch, an aborted
/// task) ends the turn the same way a cancelled token does.
pub struct ChatSession<T> {
    transport: T,
    shared: Arc<Shared>,
}

/// How the stream-reading part of a turn ended
struct StreamEnd {
    content: String,
    cancelled: bool,
}

impl<T: ChatTransport> ChatSession<T> {
    /// New session with random message ids
    pub fn new(transport: T) -> Self {
        Self::with_ids(transport, UuidIds)
    }

    /// New session with its own id generator
    pub fn with_ids(transport: T, ids: impl IdGenerator + 'static) -> Self {
        let (updates, _) = watch::channel(ChatSnapshot::default());
        Self {
            transport,
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner {
                    messages: Vec::new(),
                    state: TurnState::Idle,
                    has_error: false,
                    ids: Box::new(ids),
                }),
                updates,
            }),
        }
    }

    /// Send a user message and stream the assistant's reply
    pub async fn submit(&self, text: &str) -> TurnOutcome {
        self.run_turn(text, None).await
    }

    /// Like [`ChatSession::submit`], stopping early when `token` is cancelled
    pub async fn submit_with_cancel(&self, text: &str, token: CancellationToken) -> TurnOutcome {
        self.run_turn(text, Some(token)).await
    }

    /// Send the quick reply at `index`
    pub async fn submit_quick_reply(&self, index: usize) -> TurnOutcome {
        match quick_reply(index) {
            Some(text) => self.submit(text).await,
            None => TurnOutcome::Ignored,
        }
    }

    /// Forget the conversation. Refused while a reply is streaming.
    pub async fn clear(&self) -> bool {
        let mut inner = self.shared.inner.write().await;
        if inner.state == TurnState::Streaming {
            return false;
        }

        inner.messages.clear();
        inner.state = TurnState::Idle;
        inner.has_error = false;
        self.shared.publish(&inner);
        true
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        self.shared.inner.read().await.snapshot()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.shared.inner.read().await.messages.clone()
    }

    pub async fn state(&self) -> TurnState {
        self.shared.inner.read().await.state
    }

    pub async fn has_error(&self) -> bool {
        self.shared.inner.read().await.has_error
    }

    /// Whether the quick replies should be offered
    pub async fn shows_quick_replies(&self) -> bool {
        self.shared.inner.read().await.messages.is_empty()
    }

    /// Receive a snapshot after every change, one per applied delta while streaming
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.updates.subscribe()
    }

    async fn run_turn(&self, text: &str, cancel: Option<CancellationToken>) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }

        let (request, placeholder) = {
            let mut inner = self.shared.inner.write().await;
            if inner.state == TurnState::Streaming {
                debug!("ignoring submission while a reply is streaming");
                return TurnOutcome::Ignored;
            }

            let user = Message::user(inner.ids.next_id(), text);
            inner.messages.push(user);
            let request = ChatSupportRequest::from_history(&inner.messages);

            let placeholder = Message::assistant(inner.ids.next_id(), "");
            inner.messages.push(placeholder.clone());
            inner.state = TurnState::Streaming;
            inner.has_error = false;
            self.shared.publish(&inner);

            (request, placeholder)
        };

        let mut guard = TurnGuard {
            shared: Arc::clone(&self.shared),
            placeholder: placeholder.id.clone(),
            armed: true,
        };

        let result = self.stream_reply(&request, cancel.as_ref()).await;

        let mut inner = self.shared.inner.write().await;
        guard.disarm();
        let outcome = match result {
            Ok(end) => {
                let reply = Message {
                    content: end.content,
                    ..placeholder
                };
                inner.state = TurnState::Idle;

                if end.cancelled {
                    debug!("turn cancelled after {} bytes", reply.content.len());
                    if reply.content.is_empty() {
                        inner.messages = remove_last(std::mem::take(&mut inner.messages));
                    }
                    TurnOutcome::Cancelled(reply)
                } else {
                    TurnOutcome::Completed(reply)
                }
            }
            Err(error) => {
                warn!("support chat turn failed: {error}");
                let fallback = Message::assistant(inner.ids.next_id(), FALLBACK_REPLY);
                inner.messages = replace_last(std::mem::take(&mut inner.messages), fallback);
                inner.state = TurnState::Failed;
                inner.has_error = true;
                TurnOutcome::Failed(error)
            }
        };
        self.shared.publish(&inner);

        outcome
    }

    async fn stream_reply(
        &self,
        request: &ChatSupportRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<StreamEnd, ChatError> {
        let cancelled = || StreamEnd {
            content: String::new(),
            cancelled: true,
        };

        let mut reader = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Ok(cancelled()),
                opened = self.transport.open(request) => opened?,
            },
            None => self.transport.open(request).await?,
        };

        let mut content = String::new();
        loop {
            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        return Ok(StreamEnd { content, cancelled: true });
                    }
                    next = reader.next_delta() => next?,
                },
                None => reader.next_delta().await?,
            };

            let Some(delta) = next else {
                break;
            };

            content.push_str(&delta);
            let mut inner = self.shared.inner.write().await;
            inner.messages = append_to_last(std::mem::take(&mut inner.messages), &delta);
            self.shared.publish(&inner);
        }

        Ok(StreamEnd {
            content,
            cancelled: false,
        })
    }
}
