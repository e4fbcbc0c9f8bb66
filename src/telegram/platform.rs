use std::time::Duration;

use async_trait::async_trait;
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, ChatMemberKind, MessageEntityKind, MessageId, ParseMode as TgParseMode,
    Recipient, ReplyParameters, UpdateKind,
};
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};

use super::{
    split_message, InboundUpdate, IncomingMessage, MemberStatus, OutgoingMessage, ParseMode,
    Platform, RepliedMessage, Sender, MAX_MESSAGE_LENGTH,
};

/// Extra time on top of the long-poll timeout before the HTTP client gives up.
const POLL_TIMEOUT_SLACK_SECS: u64 = 10;

/// [`Platform`] backed by the Telegram Bot API through teloxide.
pub struct TelegramPlatform {
    bot: Bot,
    self_id: i64,
    username: String,
}

impl TelegramPlatform {
    /// Build the bot client and resolve the bot's own identity with `getMe`.
    ///
    /// The HTTP client timeout must outlive the long-poll timeout, otherwise
    /// every idle `getUpdates` call would fail client-side.
    pub async fn connect(token: &str, poll_timeout_secs: u32) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(
                u64::from(poll_timeout_secs) + POLL_TIMEOUT_SLACK_SECS,
            ))
            .build()
            .map_err(|e| {
                RelayError::Telegram(format!("failed to build Telegram HTTP client: {e}"))
            })?;
        let bot = Bot::with_client(token.to_string(), client);

        let me = bot
            .get_me()
            .await
            .map_err(|e| RelayError::Telegram(format!("getMe failed: {e}")))?;
        let self_id = me.user.id.0 as i64;
        let username = me.user.username.clone().unwrap_or_default();

        info!(bot_id = self_id, username = %username, "telegram bot authorized");

        Ok(Self {
            bot,
            self_id,
            username,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    async fn send_chunk(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<i32>,
        markdown: bool,
    ) -> std::result::Result<(), teloxide::RequestError> {
        let mut req = self.bot.send_message(chat, text.to_string());
        if let Some(reply_to) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        if markdown {
            req = req.parse_mode(legacy_markdown());
        }
        req.await.map(|_| ())
    }
}

#[async_trait]
impl Platform for TelegramPlatform {
    fn self_id(&self) -> i64 {
        self.self_id
    }

    async fn fetch_updates(&self, offset: i32, timeout_secs: u32) -> Result<Vec<InboundUpdate>> {
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(timeout_secs)
            .await
            .map_err(|e| RelayError::Telegram(format!("getUpdates failed: {e}")))?;

        debug!(offset, count = updates.len(), "telegram updates fetched");
        Ok(updates.iter().map(convert_update).collect())
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<()> {
        let chat = ChatId(msg.chat_id);

        for (i, chunk) in split_message(&msg.text, MAX_MESSAGE_LENGTH).into_iter().enumerate() {
            let reply_to = if i == 0 { msg.reply_to } else { None };
            let markdown = msg.parse_mode == Some(ParseMode::Markdown);

            // A split can separate a pair of markers; such a chunk goes out plain.
            let sent = match self.send_chunk(chat, chunk, reply_to, markdown).await {
                Err(e) if markdown => {
                    warn!(chat_id = msg.chat_id, chunk = i, err = %e, "markdown chunk rejected, resending as plain text");
                    self.send_chunk(chat, chunk, reply_to, false).await
                }
                other => other,
            };
            if let Err(e) = sent {
                error!(chat_id = msg.chat_id, err = %e, "failed to send telegram message");
                return Err(RelayError::Telegram(format!("telegram send failed: {e}")));
            }
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(|e| RelayError::Telegram(format!("sendChatAction failed: {e}")))?;
        Ok(())
    }

    async fn chat_member_status(&self, chat_name: &str, user_id: i64) -> Result<MemberStatus> {
        let username = if chat_name.starts_with('@') {
            chat_name.to_string()
        } else {
            format!("@{chat_name}")
        };

        let member = self
            .bot
            .get_chat_member(Recipient::ChannelUsername(username), UserId(user_id as u64))
            .await
            .map_err(|e| RelayError::Telegram(format!("getChatMember failed: {e}")))?;

        Ok(match member.kind {
            ChatMemberKind::Owner { .. } => MemberStatus::Creator,
            ChatMemberKind::Administrator { .. } => MemberStatus::Administrator,
            ChatMemberKind::Member { .. } => MemberStatus::Member,
            ChatMemberKind::Restricted { .. } => MemberStatus::Restricted,
            ChatMemberKind::Left { .. } => MemberStatus::Left,
            ChatMemberKind::Banned { .. } => MemberStatus::Kicked,
            #[allow(unreachable_patterns)]
            _ => MemberStatus::Member,
        })
    }
}

/// Telegram's legacy Markdown mode, which completion answers are written in.
#[allow(deprecated)]
fn legacy_markdown() -> TgParseMode {
    TgParseMode::Markdown
}

// ---------------------------------------------------------------------------
// Conversion from teloxide types
// ---------------------------------------------------------------------------

fn convert_update(update: &Update) -> InboundUpdate {
    let message = match &update.kind {
        UpdateKind::Message(msg) => Some(convert_message(msg)),
        _ => None,
    };
    InboundUpdate {
        update_id: update.id.0,
        message,
    }
}

fn convert_message(msg: &Message) -> IncomingMessage {
    let text = msg.text().unwrap_or("").to_string();

    let is_command = msg.entities().is_some_and(|entities| {
        entities
            .iter()
            .any(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::BotCommand))
    });

    let membership_change =
        msg.new_chat_members().is_some() || msg.left_chat_member().is_some();

    let reply_to = msg.reply_to_message().map(|replied| RepliedMessage {
        author_id: replied.from.as_ref().map(|u| u.id.0 as i64),
        author_is_bot: replied.from.as_ref().is_some_and(|u| u.is_bot),
    });

    IncomingMessage {
        message_id: msg.id.0,
        chat_id: msg.chat.id.0,
        is_private: msg.chat.is_private(),
        from: msg.from.as_ref().map(|u| Sender {
            id: u.id.0 as i64,
            display_name: u.full_name(),
        }),
        text,
        is_command,
        membership_change,
        reply_to,
    }
}
