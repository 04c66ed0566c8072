use ally_sse::SseReader;
use async_trait::async_trait;

use crate::{error::ChatError, message::ChatSupportRequest};

/// Opens a streaming reply for a conversation history
///
/// Implementations must only hand back a reader for a response that succeeded and has a
/// body; anything else is an error.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatSupportRequest) -> Result<SseReader, ChatError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for std::sync::Arc<T> {
    async fn open(&self, request: &ChatSupportRequest) -> Result<SseReader, ChatError> {
        (**self).open(request).await
    }
}
