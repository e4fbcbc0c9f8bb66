//! User-facing texts. Most are bilingual: English first, then Chinese.

pub const BUSY_TIP: &str = "you are chatting with me, please wait for a while.";

pub const BOT_START_TIP: &str = "Hi, I'm a ChatGPT bot. Send me a message in a private chat, \
or reply to one of my messages in a group, and I will answer you.\n\n\
你好，我是 ChatGPT 机器人。私聊给我发消息，或在群组中回复我的消息，我就会回答你。";

pub const CHATGPT_TIP: &str = "Hi, I'm ChatGPT bot. I can chat with you. Just send me a sentence and I will reply you. \n\n 请在这条消息下回复你的问题，我会回复你的。";

pub const BOT_PING_TIP: &str = "pong";

pub const UNKNOWN_COMMAND_TIP: &str = "I don't know that command";

pub const NOT_ADMIN_TIP: &str = "you are not admin";

pub const HELP_TIP: &str = "/start - start talking to me\n\
/chatgpt - what I can do\n\
/invite - your invite link\n\
/query - your remaining count and invitations\n\
/donate - support this bot\n\
/ping - check that I'm alive\n\
/help - this message";

pub const DONATE_TIP: &str = "If this bot helps you, consider supporting it. *Thank you!*\n\n\
如果这个机器人对你有帮助，欢迎支持我们。*谢谢！*";

pub const INVITE_SUCCESS_TIP: &str = "Someone joined with your invite link, your remaining count has been increased.\n\n\
有人通过你的邀请链接加入了，你的剩余次数已增加。";

pub const QUOTA_EXHAUSTED_TIP: &str = "You have used up your remaining count. Invite friends with /invite to get more.\n\n\
你的剩余次数已用完，使用 /invite 邀请好友可以获得更多次数。";

/// Notice for private-chat users who have not joined the required chats.
pub fn join_required(channel: &str, group: &str) -> String {
    format!(
        "You should join channel {channel} and group {group}, then you can talk to me\n\n\
         你需要加入频道 {channel} 和群组 {group}，然后才能和我交谈"
    )
}

pub fn invite_link(bot_username: &str, code: &str) -> String {
    format!("https://t.me/{bot_username}?start={code}")
}

pub fn invite_tip(link: &str) -> String {
    format!(
        "Share this link with your friends, you get more chances for every friend who joins:\n{link}\n\n\
         把这个链接分享给你的朋友，每有一位朋友加入你都会获得更多次数：\n{link}"
    )
}

pub fn query_tip(user_id: i64, remain_count: i64, invite_count: i64, link: &str) -> String {
    format!(
        "user id: {user_id}\nremaining count: {remain_count}\ninvited users: {invite_count}\ninvite link: {link}"
    )
}

pub fn status_tip(user_count: i64, invite_count: i64) -> String {
    format!("users: {user_count}\ninvite records: {invite_count}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_required_is_bilingual() {
        let text = join_required("@news", "@chat");
        let (en, zh) = text.split_once("\n\n").unwrap();
        assert_eq!(
            en,
            "You should join channel @news and group @chat, then you can talk to me"
        );
        assert_eq!(zh, "你需要加入频道 @news 和群组 @chat，然后才能和我交谈");
    }

    #[test]
    fn invite_link_format() {
        assert_eq!(
            invite_link("relay_bot", "abcdefghij"),
            "https://t.me/relay_bot?start=abcdefghij"
        );
    }
}
