use log::{debug, trace, warn};
use serde_json::Value;

use crate::frame::{Frame, extract_delta};

/// Result of one pass over the pending buffer
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Drain {
    /// Content deltas in arrival order
    pub deltas: Vec<String>,
    /// Whether the `[DONE]` sentinel was reached during this pass
    pub done: bool,
}

/// Newline-delimited event-frame parser over a pending text buffer
///
/// The buffer always holds exactly the text after the last newline that was consumed.
/// A data frame whose JSON did not parse stays at its front, and nothing behind it is
/// consumed until [`FrameParser::finish`] empties the buffer.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
    done: bool,
    stuck: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text to the pending buffer
    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Text not yet consumed
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Whether `[DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume every complete line currently buffered
    ///
    /// Stops early at `[DONE]` or at a data frame whose JSON does not parse. The latter
    /// is left in place, newline included. A complete line never parses differently
    /// later, so every following pass returns nothing until the final flush.
    pub fn drain(&mut self) -> Drain {
        let mut drain = Drain::default();
        if self.stuck {
            return drain;
        }

        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].find('\n') {
            let end = consumed + offset;
            let line = &self.buffer[consumed..end];

            match Frame::classify(line) {
                Frame::Blank | Frame::Comment | Frame::Other => {}
                Frame::Done => {
                    consumed = end + 1;
                    self.done = true;
                    drain.done = true;
                    break;
                }
                // Keep-alive with nothing after the prefix
                Frame::Data("") => {}
                Frame::Data(payload) => match serde_json::from_str::<Value>(payload) {
                    Ok(chunk) => {
                        if let Some(delta) = extract_delta(&chunk) {
                            trace!("delta: {delta:?}");
                            drain.deltas.push(delta.to_owned());
                        }
                    }
                    Err(e) => {
                        debug!("deferring incomplete frame ({e}): {} bytes", line.len());
                        self.stuck = true;
                        break;
                    }
                },
            }

            consumed = end + 1;
        }

        self.buffer.drain(..consumed);
        drain
    }

    /// Final flush once the transport has ended
    ///
    /// Every remaining line is parsed on its own. Nothing more is coming, so a frame
    /// that still fails to parse is dropped instead of deferred.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.stuck = false;
        let mut deltas = Vec::new();

        for raw in rest.split('\n') {
            let Frame::Data(payload) = Frame::classify(raw) else {
                continue;
            };
            if payload.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(payload) {
                Ok(chunk) => {
                    if let Some(delta) = extract_delta(&chunk) {
                        trace!("delta (final flush): {delta:?}");
                        deltas.push(delta.to_owned());
                    }
                }
                Err(e) => warn!("dropping unparsable trailing frame: {e}"),
            }
        }

        deltas
    }
}
