#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(clippy::pedantic, clippy::unwrap_used)]

//! Incremental server-sent-events reader for streaming chat completions
//!
//! This crate turns the byte stream of a `text/event-stream` response into the
//! ordered sequence of `choices[0].delta.content` fragments it carries. It is split
//! into a transport half ([`SseReader`]) that pulls and decodes bytes, and a pure
//! frame parser ([`FrameParser`]) that can be driven without any network at all.

pub mod decoder;
pub mod error;
pub mod frame;
pub mod parser;
pub mod reader;

pub use decoder::Utf8Decoder;
pub use error::StreamError;
pub use frame::{DONE_SENTINEL, Frame, extract_delta};
pub use parser::{Drain, FrameParser};
pub use reader::{ByteStream, SseReader};

/// Re-export common types for convenience
pub use bytes::Bytes;
pub use futures_util::stream::BoxStream;
