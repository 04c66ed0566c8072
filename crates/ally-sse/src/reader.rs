use std::collections::VecDeque;

use async_stream::try_stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt, stream::BoxStream};
use log::debug;

use crate::{
    decoder::Utf8Decoder,
    error::{self, StreamError},
    parser::FrameParser,
};

/// Raw response body as a stream of byte chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Reads content deltas out of a streaming chat-completion response
///
/// Each network chunk is decoded and parsed before the next one is requested, so deltas
/// come out strictly in arrival order. Reading stops at `[DONE]` or when the body ends,
/// after which the remaining buffered text gets one final flush.
pub struct SseReader {
    byte_stream: ByteStream,
    decoder: Utf8Decoder,
    parser: FrameParser,
    ready: VecDeque<String>,
    finished: bool,
}

impl SseReader {
    /// Wrap a response the caller has already checked for success
    pub fn new(response: reqwest::Response) -> Self {
        Self::from_stream(response.bytes_stream().map_err(StreamError::from))
    }

    /// Wrap any byte source
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self {
            byte_stream: Box::pin(stream),
            decoder: Utf8Decoder::new(),
            parser: FrameParser::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Check status and body, then wrap the response
    ///
    /// # Errors
    ///
    /// [`StreamError::Api`] for a non-success status, [`StreamError::StreamUnavailable`]
    /// for `204 No Content`. An empty `200` body is an empty stream, not an error.
    pub async fn from_response(response: reqwest::Response) -> Result<Self, StreamError> {
        let status = response.status();

        if !status.is_success() {
            let bytes = response.bytes().await?;
            return Err(error::parse_error_response(status, &bytes));
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(StreamError::StreamUnavailable);
        }

        Ok(Self::new(response))
    }

    /// Get the next content delta, or `None` once the stream is exhausted
    ///
    /// # Errors
    ///
    /// Propagates transport failures. After an error the reader is finished.
    pub async fn next_delta(&mut self) -> Result<Option<String>, StreamError> {
        loop {
            if let Some(delta) = self.ready.pop_front() {
                return Ok(Some(delta));
            }

            if self.finished {
                return Ok(None);
            }

            if self.parser.is_done() {
                self.flush();
                continue;
            }

            match self.byte_stream.next().await {
                Some(Ok(chunk)) => {
                    let text = self.decoder.decode(&chunk);
                    self.parser.push_str(&text);
                    let drain = self.parser.drain();
                    if drain.done {
                        debug!("received [DONE] sentinel");
                    }
                    self.ready.extend(drain.deltas);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => self.flush(),
            }
        }
    }

    /// Whether the `[DONE]` sentinel was seen
    pub fn saw_done(&self) -> bool {
        self.parser.is_done()
    }

    /// Adapt into a stream of deltas
    pub fn into_stream(self) -> BoxStream<'static, Result<String, StreamError>> {
        let mut reader = self;

        Box::pin(try_stream! {
            while let Some(delta) = reader.next_delta().await? {
                yield delta;
            }
        })
    }

    fn flush(&mut self) {
        let tail = self.decoder.finish();
        self.parser.push_str(&tail);
        self.ready.extend(self.parser.finish());
        self.finished = true;
    }
}
