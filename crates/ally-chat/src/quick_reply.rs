/// Canned prompts offered before the first message of a conversation
pub const QUICK_REPLIES: &[&str] = &[
    "How do I log a water test?",
    "What pH should my pool be?",
    "Why is my aquarium water cloudy?",
    "How do I set up maintenance reminders?",
    "What's included in the paid plans?",
];

/// Quick-reply text at `index`
pub fn quick_reply(index: usize) -> Option<&'static str> {
    QUICK_REPLIES.get(index).copied()
}
