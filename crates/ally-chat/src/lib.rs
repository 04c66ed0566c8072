//! Ally support-chat client for Rust
//!
//! Streams assistant replies from the hosted `chat-support` function into a
//! conversation, token by token:
//! - [`ChatSupportClient`] posts the history and opens the event stream
//! - [`ChatSession`] owns the message list and the turn state machine
//! - [`reducer`] holds the whole-list update functions used while streaming
//!
//! # Example
//!
//! ```rust,no_run
//! use ally_chat::{ChatSession, ChatSupportClient, TurnOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChatSupportClient::from_env()?;
//!     let session = ChatSession::new(client);
//!
//!     match session.submit("What pH should my pool be?").await {
//!         TurnOutcome::Completed(reply) => println!("{}", reply.content),
//!         TurnOutcome::Failed(e) => eprintln!("chat failed: {e}"),
//!         _ => {}
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod ids;
pub mod message;
pub mod quick_reply;
pub mod reducer;
pub mod session;
pub mod transport;

// Re-export main types
pub use client::ChatSupportClient;
pub use error::ChatError;
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use message::{ChatSupportRequest, ChatTurn, Message, MessageId, Role};
pub use quick_reply::{QUICK_REPLIES, quick_reply};
pub use session::{ChatSession, ChatSnapshot, FALLBACK_REPLY, TurnOutcome, TurnState};
pub use transport::ChatTransport;

// Re-export the stream types transports deal in
pub use ally_sse::{SseReader, StreamError};
pub use tokio_util::sync::CancellationToken;
