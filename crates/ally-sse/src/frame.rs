use serde_json::Value;

/// Payload that marks the logical end of a completion stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Prefix of a data frame. The trailing space is part of the contract.
const DATA_PREFIX: &str = "data: ";

/// A single line of an event stream, classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Empty line separating events
    Blank,
    /// Line starting with `:`
    Comment,
    /// `data: [DONE]`
    Done,
    /// `data: <payload>` with the payload trimmed
    Data(&'a str),
    /// Anything else (`event:`, `id:`, `retry:`, junk); silently ignored
    Other,
}

impl<'a> Frame<'a> {
    /// Classify one line, with its `\n` already removed. A single trailing `\r` is stripped.
    pub fn classify(line: &'a str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return Frame::Blank;
        }

        if line.starts_with(':') {
            return Frame::Comment;
        }

        match line.strip_prefix(DATA_PREFIX) {
            Some(rest) => {
                let payload = rest.trim();
                if payload == DONE_SENTINEL {
                    Frame::Done
                } else {
                    Frame::Data(payload)
                }
            }
            None => Frame::Other,
        }
    }
}

/// Pull the incremental text out of a chat-completion chunk (`choices[0].delta.content`)
///
/// Returns `None` for chunks of any other shape, for non-string content and for empty strings.
pub fn extract_delta(chunk: &Value) -> Option<&str> {
    chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
}
