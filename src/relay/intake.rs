use tracing::{debug, error, info, warn};

use crate::telegram::tips;
use crate::telegram::{InboundUpdate, IncomingMessage, OutgoingMessage};

use super::{ChatTask, Relay};

/// What to do with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    Command,
    Discard(DiscardReason),
    /// A plain message the bot was not asked to answer.
    NotAddressed,
    /// A question for the bot. `private` decides whether gating applies.
    Addressed { private: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    MembershipChange,
    EmptyText,
    /// Reply to a message whose author is not a bot.
    ReplyToUser,
    NoSender,
}

/// Classify a message. Discard rules are evaluated before addressing.
pub fn classify(msg: &IncomingMessage, bot_id: i64) -> Intake {
    if msg.is_command {
        return Intake::Command;
    }
    if msg.membership_change {
        return Intake::Discard(DiscardReason::MembershipChange);
    }
    if msg.text.trim().is_empty() {
        return Intake::Discard(DiscardReason::EmptyText);
    }
    if msg.reply_to.as_ref().is_some_and(|r| !r.author_is_bot) {
        return Intake::Discard(DiscardReason::ReplyToUser);
    }
    if msg.from.is_none() {
        return Intake::Discard(DiscardReason::NoSender);
    }
    if msg.is_private || msg.is_reply_to(bot_id) {
        Intake::Addressed {
            private: msg.is_private,
        }
    } else {
        Intake::NotAddressed
    }
}

impl Relay {
    /// Handle one update end to end, up to and including enqueueing. May
    /// wait for space in the task queue.
    pub(crate) async fn handle_update(&self, update: InboundUpdate) {
        let update_id = update.update_id;
        let Some(msg) = update.message else {
            debug!(update_id, "update without message ignored");
            return;
        };

        match classify(&msg, self.platform.self_id()) {
            Intake::Command => {
                if let Some(reply) = self.commands.dispatch(&msg).await {
                    self.send(&reply).await;
                }
            }
            Intake::Discard(reason) => {
                debug!(update_id, chat_id = msg.chat_id, ?reason, "message discarded");
            }
            Intake::NotAddressed => {}
            Intake::Addressed { private } => self.admit(msg, private).await,
        }
    }

    async fn admit(&self, msg: IncomingMessage, private: bool) {
        let Some(user_id) = msg.sender_id() else {
            return;
        };
        let chat_id = msg.chat_id;

        if private && !self.gate.passes(user_id).await {
            info!(user_id, "sender has not joined the required chats");
            let notice = tips::join_required(self.gate.channel(), self.gate.group());
            self.send(&OutgoingMessage::new(chat_id, notice).reply_to(msg.message_id))
                .await;
            return;
        }

        if let Some(quota) = &self.quota {
            match quota.admit(user_id, msg.sender_name()).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(user_id, "quota exhausted");
                    let notice = OutgoingMessage::new(chat_id, tips::QUOTA_EXHAUSTED_TIP)
                        .reply_to(msg.message_id);
                    self.send(&notice).await;
                    return;
                }
                // Storage trouble does not lock users out.
                Err(e) => warn!(user_id, err = %e, "quota check failed, admitting"),
            }
        }

        let Some(session) = self.sessions.try_acquire(user_id) else {
            debug!(user_id, "question rejected, previous one still outstanding");
            self.send(&OutgoingMessage::new(chat_id, tips::BUSY_TIP)).await;
            return;
        };

        let task = ChatTask::new(msg.text, chat_id, msg.message_id, session);
        if self.queue_tx.send(task).await.is_err() {
            error!(user_id, "task queue closed, question dropped");
            return;
        }
        info!(user_id, chat_id, "question queued");

        if let Err(e) = self.platform.send_typing(chat_id).await {
            warn!(chat_id, err = %e, "failed to send typing indicator");
        }
    }
}
