use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::flags::RuntimeFlags;
use crate::users::{is_invite_code, InviteRepository, UserRepository};

use super::tips;
use super::{IncomingMessage, OutgoingMessage, Platform};

/// Handles `/command` messages. The returned message, if any, is sent by the
/// caller.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, msg: &IncomingMessage) -> Option<OutgoingMessage>;
}

/// The bot's built-in commands.
pub struct BotCommandHandler {
    platform: Arc<dyn Platform>,
    users: Arc<UserRepository>,
    invites: Arc<InviteRepository>,
    flags: Arc<RuntimeFlags>,
    admin_ids: Vec<i64>,
    bot_username: String,
    invite_bonus: i64,
}

impl BotCommandHandler {
    pub fn new(
        platform: Arc<dyn Platform>,
        users: Arc<UserRepository>,
        invites: Arc<InviteRepository>,
        flags: Arc<RuntimeFlags>,
        config: &Config,
    ) -> Self {
        Self {
            platform,
            users,
            invites,
            flags,
            admin_ids: config.telegram.admin_ids.clone(),
            bot_username: config.telegram.bot_username.clone(),
            invite_bonus: config.quota.invite_bonus,
        }
    }

    /// Username used in invite links.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = username.into();
        self
    }

    fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    async fn run(
        &self,
        msg: &IncomingMessage,
        user_id: i64,
        name: &str,
        args: &str,
    ) -> Result<Option<OutgoingMessage>> {
        let chat_id = msg.chat_id;
        let reply = |text: String| -> Result<Option<OutgoingMessage>> {
            Ok(Some(OutgoingMessage::new(chat_id, text)))
        };

        match name {
            "start" => {
                if is_invite_code(args) {
                    if let Err(e) = self.handle_invitation(args, user_id).await {
                        warn!(user_id, code = args, err = %e, "invitation not applied");
                    }
                }
                reply(tips::BOT_START_TIP.into())
            }
            "chatgpt" => reply(tips::CHATGPT_TIP.into()),
            "help" => reply(tips::HELP_TIP.into()),
            "ping" => reply(tips::BOT_PING_TIP.into()),
            "donate" => Ok(Some(OutgoingMessage::new(chat_id, tips::DONATE_TIP).markdown())),
            "invite" => {
                let user = self.users.get_or_init(user_id, msg.sender_name()).await?;
                let link = tips::invite_link(&self.bot_username, &user.invite_code);
                reply(tips::invite_tip(&link))
            }
            "query" => {
                let user = self.users.get_or_init(user_id, msg.sender_name()).await?;
                let invited = self.invites.count_by_user(user_id).await?;
                let link = tips::invite_link(&self.bot_username, &user.invite_code);
                let text = tips::query_tip(user_id, user.remain_count, invited, &link);
                Ok(Some(OutgoingMessage::new(chat_id, text).reply_to(msg.message_id)))
            }
            "status" | "count" | "push" | "limiter" | "down" if !self.is_admin(user_id) => {
                reply(tips::NOT_ADMIN_TIP.into())
            }
            "status" => {
                let users = self.users.count().await?;
                let invites = self.invites.count().await?;
                reply(tips::status_tip(users, invites))
            }
            "count" => {
                let (target, count) = parse_count_args(args)?;
                match self.users.set_count(target, count).await {
                    Ok(()) => {
                        info!(admin = user_id, target, count, "remaining count set");
                        reply("success".into())
                    }
                    Err(e) => reply(format!("failed to set count. params: {args}, err: {e}")),
                }
            }
            "push" => {
                let text = if args.is_empty() { tips::DONATE_TIP } else { args };
                let sent = self.push(text).await?;
                reply(format!("pushing to {sent} users"))
            }
            "limiter" => {
                let enabled = parse_bool(args);
                self.flags.set_limiter(enabled);
                info!(admin = user_id, enabled, "limiter toggled");
                reply(format!("limiter status is {enabled} now"))
            }
            "down" => {
                let downgraded = self.flags.toggle_downgrade();
                info!(admin = user_id, downgraded, "downgrade mode toggled");
                reply(format!("downgrade mode is {downgraded} now"))
            }
            _ => reply(tips::UNKNOWN_COMMAND_TIP.into()),
        }
    }

    /// Record that `invitee` joined with `code`, credit the inviter and let
    /// them know. Self-invites and users who were already invited are
    /// ignored.
    async fn handle_invitation(&self, code: &str, invitee: i64) -> Result<()> {
        let inviter = self
            .users
            .get_by_invite_code(code)
            .await?
            .ok_or_else(|| RelayError::Command(format!("no such user by invite code: {code}")))?;

        if inviter.user_id == invitee {
            debug!(user_id = invitee, "ignoring self-invitation");
            return Ok(());
        }
        if let Some(record) = self.invites.get_by_invite_user(invitee).await? {
            debug!(user_id = invitee, inviter = record.user_id, "user was already invited");
            return Ok(());
        }

        self.invites.insert(inviter.user_id, invitee).await?;
        self.users.add_count(inviter.user_id, self.invite_bonus).await?;

        let notice = OutgoingMessage::new(inviter.user_id, tips::INVITE_SUCCESS_TIP);
        if let Err(e) = self.platform.send_message(&notice).await {
            warn!(user_id = inviter.user_id, err = %e, "failed to notify inviter");
        }
        Ok(())
    }

    /// Fan a Markdown message out to every stored user, one task per send.
    async fn push(&self, text: &str) -> Result<usize> {
        let user_ids = self.users.all_user_ids().await?;
        for &uid in &user_ids {
            let platform = self.platform.clone();
            let msg = OutgoingMessage::new(uid, text).markdown();
            tokio::spawn(async move {
                if let Err(e) = platform.send_message(&msg).await {
                    warn!(user_id = uid, err = %e, "push failed");
                }
            });
        }
        Ok(user_ids.len())
    }
}

#[async_trait]
impl CommandDispatcher for BotCommandHandler {
    async fn dispatch(&self, msg: &IncomingMessage) -> Option<OutgoingMessage> {
        let (name, args) = msg.command()?;
        let Some(user_id) = msg.sender_id() else {
            debug!(chat_id = msg.chat_id, command = name, "command without sender ignored");
            return None;
        };
        debug!(chat_id = msg.chat_id, user_id, command = name, "dispatching command");

        match self.run(msg, user_id, name, args).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user_id, command = name, err = %e, "command failed");
                Some(OutgoingMessage::new(msg.chat_id, e.to_string()))
            }
        }
    }
}

/// `<user_id>:<count>`
fn parse_count_args(args: &str) -> Result<(i64, i64)> {
    let invalid = || RelayError::Command(format!("invalid args: {args:?}, want <user_id>:<count>"));
    let (user, count) = args.split_once(':').ok_or_else(invalid)?;
    let user = user.trim().parse().map_err(|_| invalid())?;
    let count = count.trim().parse().map_err(|_| invalid())?;
    Ok((user, count))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "t" | "1" | "yes" | "y"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::telegram::testing::{private_message, wait_until, MockPlatform};

    const ADMIN: i64 = 1;

    struct Fixture {
        platform: Arc<MockPlatform>,
        users: Arc<UserRepository>,
        invites: Arc<InviteRepository>,
        flags: Arc<RuntimeFlags>,
        handler: BotCommandHandler,
    }

    fn fixture() -> Fixture {
        let db = test_db();
        let platform = Arc::new(MockPlatform::new());
        let users = Arc::new(UserRepository::new(db.clone(), 10));
        let invites = Arc::new(InviteRepository::new(db));
        let flags = Arc::new(RuntimeFlags::default());

        let mut config = Config::default();
        config.telegram.admin_ids = vec![ADMIN];
        config.quota.invite_bonus = 5;

        let handler = BotCommandHandler::new(
            platform.clone(),
            users.clone(),
            invites.clone(),
            flags.clone(),
            &config,
        )
        .with_bot_username("relay_bot");

        Fixture {
            platform,
            users,
            invites,
            flags,
            handler,
        }
    }

    async fn send(f: &Fixture, user_id: i64, text: &str) -> Option<String> {
        f.handler
            .dispatch(&private_message(1, user_id, text))
            .await
            .map(|m| m.text)
    }

    #[tokio::test]
    async fn simple_commands() {
        let f = fixture();
        assert_eq!(send(&f, 7, "/ping").await.unwrap(), "pong");
        assert_eq!(send(&f, 7, "/help").await.unwrap(), tips::HELP_TIP);
        assert_eq!(send(&f, 7, "/chatgpt").await.unwrap(), tips::CHATGPT_TIP);
        assert_eq!(send(&f, 7, "/start").await.unwrap(), tips::BOT_START_TIP);
        assert_eq!(send(&f, 7, "/nope").await.unwrap(), tips::UNKNOWN_COMMAND_TIP);
    }

    #[tokio::test]
    async fn donate_is_markdown() {
        let f = fixture();
        let reply = f
            .handler
            .dispatch(&private_message(1, 7, "/donate"))
            .await
            .unwrap();
        assert_eq!(reply.text, tips::DONATE_TIP);
        assert!(reply.parse_mode.is_some());
    }

    #[tokio::test]
    async fn non_command_is_not_dispatched() {
        let f = fixture();
        assert!(send(&f, 7, "hello").await.is_none());
    }

    #[tokio::test]
    async fn admin_commands_require_admin() {
        let f = fixture();
        for cmd in ["/status", "/count 7:3", "/push hi", "/limiter on", "/down"] {
            assert_eq!(send(&f, 7, cmd).await.unwrap(), tips::NOT_ADMIN_TIP, "{cmd}");
        }
        assert!(!f.flags.limiter_enabled());
        assert!(!f.flags.downgraded());
    }

    #[tokio::test]
    async fn invite_creates_user_and_link() {
        let f = fixture();
        let text = send(&f, 7, "/invite").await.unwrap();
        let user = f.users.get(7).await.unwrap().unwrap();
        assert!(text.contains(&format!("https://t.me/relay_bot?start={}", user.invite_code)));
        assert_eq!(user.remain_count, 10);
    }

    #[tokio::test]
    async fn start_with_code_credits_inviter() {
        let f = fixture();
        let inviter = f.users.get_or_init(7, "inviter").await.unwrap();

        let text = send(&f, 8, &format!("/start {}", inviter.invite_code)).await.unwrap();
        assert_eq!(text, tips::BOT_START_TIP);

        assert_eq!(f.users.get(7).await.unwrap().unwrap().remain_count, 15);
        assert_eq!(f.invites.count_by_user(7).await.unwrap(), 1);
        let notices = f.platform.sent();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].chat_id, 7);
        assert_eq!(notices[0].text, tips::INVITE_SUCCESS_TIP);

        // A second code use by the same user changes nothing.
        send(&f, 8, &format!("/start {}", inviter.invite_code)).await;
        assert_eq!(f.users.get(7).await.unwrap().unwrap().remain_count, 15);
        assert_eq!(f.platform.sent().len(), 1);
    }

    #[tokio::test]
    async fn self_invite_is_ignored() {
        let f = fixture();
        let user = f.users.get_or_init(7, "me").await.unwrap();
        send(&f, 7, &format!("/start {}", user.invite_code)).await;
        assert_eq!(f.invites.count().await.unwrap(), 0);
        assert_eq!(f.users.get(7).await.unwrap().unwrap().remain_count, 10);
    }

    #[tokio::test]
    async fn unknown_code_still_greets() {
        let f = fixture();
        let text = send(&f, 8, "/start zzzzzzzzzz").await.unwrap();
        assert_eq!(text, tips::BOT_START_TIP);
        assert_eq!(f.invites.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_reports_counts() {
        let f = fixture();
        let reply = f
            .handler
            .dispatch(&private_message(31, 7, "/query"))
            .await
            .unwrap();
        assert_eq!(reply.chat_id, 7);
        assert_eq!(reply.reply_to, Some(31));
        assert!(reply.text.contains("user id: 7"));
        assert!(reply.text.contains("remaining count: 10"));
        assert!(reply.text.contains("invited users: 0"));
    }

    #[tokio::test]
    async fn status_counts_users_and_invites() {
        let f = fixture();
        f.users.get_or_init(7, "a").await.unwrap();
        f.invites.insert(7, 8).await.unwrap();
        assert_eq!(
            send(&f, ADMIN, "/status").await.unwrap(),
            tips::status_tip(1, 1)
        );
    }

    #[tokio::test]
    async fn count_sets_remaining() {
        let f = fixture();
        f.users.get_or_init(7, "a").await.unwrap();
        assert_eq!(send(&f, ADMIN, "/count 7:42").await.unwrap(), "success");
        assert_eq!(f.users.get(7).await.unwrap().unwrap().remain_count, 42);

        let text = send(&f, ADMIN, "/count 99:1").await.unwrap();
        assert!(text.starts_with("failed to set count"), "{text}");

        let text = send(&f, ADMIN, "/count garbage").await.unwrap();
        assert!(text.contains("invalid args"), "{text}");
    }

    #[tokio::test]
    async fn limiter_and_downgrade_toggles() {
        let f = fixture();
        assert_eq!(send(&f, ADMIN, "/limiter on").await.unwrap(), "limiter status is true now");
        assert!(f.flags.limiter_enabled());
        assert_eq!(send(&f, ADMIN, "/limiter off").await.unwrap(), "limiter status is false now");
        assert!(!f.flags.limiter_enabled());

        assert_eq!(send(&f, ADMIN, "/down").await.unwrap(), "downgrade mode is true now");
        assert!(f.flags.downgraded());
        assert_eq!(send(&f, ADMIN, "/down").await.unwrap(), "downgrade mode is false now");
    }

    #[tokio::test]
    async fn push_reaches_every_user() {
        let f = fixture();
        f.users.get_or_init(7, "a").await.unwrap();
        f.users.get_or_init(8, "b").await.unwrap();

        assert_eq!(send(&f, ADMIN, "/push hello all").await.unwrap(), "pushing to 2 users");
        wait_until(|| f.platform.sent().len() == 2).await;

        let mut targets: Vec<i64> = f.platform.sent().iter().map(|m| m.chat_id).collect();
        targets.sort();
        assert_eq!(targets, vec![7, 8]);
        assert!(f.platform.sent().iter().all(|m| m.text == "hello all"));
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_count_args("12:3").unwrap(), (12, 3));
        assert!(parse_count_args("12").is_err());
        assert!(parse_count_args("a:b").is_err());
        assert!(parse_bool("ON"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }
}
