pub mod commands;
pub mod platform;
pub mod tips;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;

pub use platform::TelegramPlatform;

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// One inbound platform event. Only message updates carry a payload; every
/// other update kind arrives with `message: None`.
#[derive(Debug, Clone)]
pub struct InboundUpdate {
    pub update_id: u32,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: i32,
    pub chat_id: i64,
    /// One-to-one conversation with the bot.
    pub is_private: bool,
    pub from: Option<Sender>,
    /// Message text, empty for media without a caption.
    pub text: String,
    /// The text starts with a `bot_command` entity.
    pub is_command: bool,
    /// Service message announcing users joining or leaving the chat.
    pub membership_change: bool,
    pub reply_to: Option<RepliedMessage>,
}

#[derive(Debug, Clone)]
pub struct Sender {
    pub id: i64,
    pub display_name: String,
}

/// The message an incoming message replies to.
#[derive(Debug, Clone)]
pub struct RepliedMessage {
    pub author_id: Option<i64>,
    pub author_is_bot: bool,
}

impl IncomingMessage {
    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.id)
    }

    pub fn sender_name(&self) -> &str {
        self.from.as_ref().map(|u| u.display_name.as_str()).unwrap_or("")
    }

    /// Whether this message replies to something written by `bot_id`.
    pub fn is_reply_to(&self, bot_id: i64) -> bool {
        self.reply_to
            .as_ref()
            .is_some_and(|r| r.author_id == Some(bot_id))
    }

    /// Split a command message into `(name, arguments)`.
    ///
    /// The leading `/` and any `@botname` suffix are stripped from the name;
    /// the arguments are everything after the first space, trimmed.
    pub fn command(&self) -> Option<(&str, &str)> {
        if !self.is_command {
            return None;
        }
        let body = self.text.strip_prefix('/')?;
        let (head, args) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        Some((name, args))
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i32>,
    pub parse_mode: Option<ParseMode>,
}

impl OutgoingMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to: None,
            parse_mode: None,
        }
    }

    pub fn reply_to(mut self, message_id: i32) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn markdown(mut self) -> Self {
        self.parse_mode = Some(ParseMode::Markdown);
        self
    }
}

// ---------------------------------------------------------------------------
// Chat membership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    /// `left` and `kicked` are the only statuses that mean "not in the chat".
    pub fn is_member(&self) -> bool {
        !matches!(self, Self::Left | Self::Kicked)
    }
}

// ---------------------------------------------------------------------------
// Platform trait
// ---------------------------------------------------------------------------

/// The messaging-platform operations the relay depends on.
#[async_trait]
pub trait Platform: Send + Sync {
    /// User ID of the bot account itself.
    fn self_id(&self) -> i64;

    /// Long-poll for updates with `update_id >= offset`.
    async fn fetch_updates(&self, offset: i32, timeout_secs: u32) -> Result<Vec<InboundUpdate>>;

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<()>;

    /// Show the "typing…" indicator in a chat.
    async fn send_typing(&self, chat_id: i64) -> Result<()>;

    /// Membership status of `user_id` in the public chat `chat_name`.
    async fn chat_member_status(&self, chat_name: &str, user_id: i64) -> Result<MemberStatus>;
}

// ---------------------------------------------------------------------------
// Message splitting
// ---------------------------------------------------------------------------

/// Split a long message into chunks that fit within the given character limit.
/// Tries to break at newlines near the end of each chunk for readability.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if max_len == 0 || text.chars().count() <= max_len {
        return vec![text];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let break_at = if end < rest.len() {
            rest[..end]
                .rfind('\n')
                .filter(|&pos| pos > end.saturating_sub(200))
                .map(|pos| pos + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&rest[..break_at]);
        rest = &rest[break_at..];
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str, is_command: bool) -> IncomingMessage {
        IncomingMessage {
            message_id: 1,
            chat_id: 10,
            is_private: true,
            from: Some(Sender {
                id: 5,
                display_name: "alice".into(),
            }),
            text: text.into(),
            is_command,
            membership_change: false,
            reply_to: None,
        }
    }

    #[test]
    fn command_parsing() {
        let m = message("/start abcdefghij", true);
        assert_eq!(m.command(), Some(("start", "abcdefghij")));

        let m = message("/ping@relay_bot", true);
        assert_eq!(m.command(), Some(("ping", "")));

        let m = message("/push  hello world ", true);
        assert_eq!(m.command(), Some(("push", "hello world")));

        let m = message("/ping", false);
        assert_eq!(m.command(), None);
    }

    #[test]
    fn reply_predicate() {
        let mut m = message("hi", false);
        assert!(!m.is_reply_to(99));
        m.reply_to = Some(RepliedMessage {
            author_id: Some(99),
            author_is_bot: true,
        });
        assert!(m.is_reply_to(99));
        assert!(!m.is_reply_to(100));
    }

    #[test]
    fn member_statuses() {
        assert!(MemberStatus::Creator.is_member());
        assert!(MemberStatus::Administrator.is_member());
        assert!(MemberStatus::Member.is_member());
        assert!(MemberStatus::Restricted.is_member());
        assert!(!MemberStatus::Left.is_member());
        assert!(!MemberStatus::Kicked.is_member());
    }

    #[test]
    fn outgoing_builder() {
        let msg = OutgoingMessage::new(1, "hi").reply_to(7).markdown();
        assert_eq!(msg.reply_to, Some(7));
        assert_eq!(msg.parse_mode, Some(ParseMode::Markdown));
        assert_eq!(OutgoingMessage::new(1, "x").parse_mode, None);
    }

    #[test]
    fn test_split_message_short() {
        assert_eq!(split_message("Hello world", 100), vec!["Hello world"]);
    }

    #[test]
    fn test_split_message_long_splits() {
        let text = "a".repeat(250);
        let chunks = split_message(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn test_split_message_breaks_at_newline() {
        let text = "Line one\nLine two\nLine three\nLine four";
        let chunks = split_message(text, 30);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn test_split_message_counts_chars_not_bytes() {
        let text = "你好".repeat(3);
        assert_eq!(split_message(&text, 6), vec![text.as_str()]);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks, vec!["你好你好", "你好"]);
    }

    #[test]
    fn test_split_message_empty_and_zero() {
        assert_eq!(split_message("", 100), vec![""]);
        assert_eq!(split_message("hello", 0), vec!["hello"]);
    }
}
