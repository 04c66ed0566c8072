//! Whole-list updates of the message history
//!
//! Every change made while a reply streams goes through one of these functions. They take
//! the current list by value and return the new one, touching only the last element.

use crate::message::Message;

/// Append a content delta to the last message
pub fn append_to_last(mut messages: Vec<Message>, delta: &str) -> Vec<Message> {
    if let Some(last) = messages.last_mut() {
        last.content.push_str(delta);
    }
    messages
}

/// Replace the last message, or push it onto an empty list
pub fn replace_last(mut messages: Vec<Message>, message: Message) -> Vec<Message> {
    match messages.last_mut() {
        Some(last) => *last = message,
        None => messages.push(message),
    }
    messages
}

/// Drop the last message
pub fn remove_last(mut messages: Vec<Message>) -> Vec<Message> {
    messages.pop();
    messages
}
