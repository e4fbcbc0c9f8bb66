//! In-memory [`Platform`] and message builders for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RelayError, Result};

use super::{
    InboundUpdate, IncomingMessage, MemberStatus, OutgoingMessage, ParseMode, Platform,
    RepliedMessage, Sender,
};

pub(crate) const BOT_ID: i64 = 1000;

/// Records every outbound call. Membership answers come from a table; a user
/// missing from the table makes the lookup fail. Scripted update batches are
/// served in order, after which `fetch_updates` never returns.
///
/// With `strict_markdown` set, Markdown sends with an unpaired `_` or `*` are
/// refused the way Telegram refuses entities it cannot parse.
pub(crate) struct MockPlatform {
    pub sent: StdMutex<Vec<OutgoingMessage>>,
    pub typed: StdMutex<Vec<i64>>,
    pub offsets: StdMutex<Vec<i32>>,
    pub member_queries: AtomicUsize,
    pub fail_sends: AtomicBool,
    pub strict_markdown: AtomicBool,
    members: StdMutex<HashMap<(String, i64), MemberStatus>>,
    script: StdMutex<VecDeque<std::result::Result<Vec<InboundUpdate>, String>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            sent: StdMutex::new(Vec::new()),
            typed: StdMutex::new(Vec::new()),
            offsets: StdMutex::new(Vec::new()),
            member_queries: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            strict_markdown: AtomicBool::new(false),
            members: StdMutex::new(HashMap::new()),
            script: StdMutex::new(VecDeque::new()),
        }
    }

    pub fn set_member(&self, chat: &str, user_id: i64, status: MemberStatus) {
        self.members
            .lock()
            .unwrap()
            .insert((chat.to_string(), user_id), status);
    }

    pub fn push_updates(&self, updates: Vec<InboundUpdate>) {
        self.script.lock().unwrap().push_back(Ok(updates));
    }

    pub fn push_fetch_error(&self, error: &str) {
        self.script.lock().unwrap().push_back(Err(error.to_string()));
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn typed(&self) -> Vec<i64> {
        self.typed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn self_id(&self) -> i64 {
        BOT_ID
    }

    async fn fetch_updates(&self, offset: i32, _timeout_secs: u32) -> Result<Vec<InboundUpdate>> {
        self.offsets.lock().unwrap().push(offset);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(updates)) => Ok(updates),
            Some(Err(e)) => Err(RelayError::Telegram(e)),
            None => std::future::pending().await,
        }
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::Telegram("send refused".into()));
        }
        if self.strict_markdown.load(Ordering::SeqCst)
            && msg.parse_mode == Some(ParseMode::Markdown)
            && !markdown_balanced(&msg.text)
        {
            return Err(RelayError::Telegram(
                "Bad Request: can't parse entities".into(),
            ));
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.typed.lock().unwrap().push(chat_id);
        Ok(())
    }

    async fn chat_member_status(&self, chat_name: &str, user_id: i64) -> Result<MemberStatus> {
        self.member_queries.fetch_add(1, Ordering::SeqCst);
        self.members
            .lock()
            .unwrap()
            .get(&(chat_name.to_string(), user_id))
            .copied()
            .ok_or_else(|| RelayError::Telegram("user not found".into()))
    }
}

fn markdown_balanced(text: &str) -> bool {
    ['_', '*']
        .iter()
        .all(|marker| text.matches(*marker).count() % 2 == 0)
}

// -- Builders ----------------------------------------------------------------

/// Private-chat text message; the chat id equals the user id.
pub(crate) fn private_message(message_id: i32, user_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        message_id,
        chat_id: user_id,
        is_private: true,
        from: Some(Sender {
            id: user_id,
            display_name: format!("user{user_id}"),
        }),
        text: text.to_string(),
        is_command: text.starts_with('/'),
        membership_change: false,
        reply_to: None,
    }
}

pub(crate) fn group_message(
    message_id: i32,
    chat_id: i64,
    user_id: i64,
    text: &str,
) -> IncomingMessage {
    IncomingMessage {
        chat_id,
        is_private: false,
        ..private_message(message_id, user_id, text)
    }
}

/// Mark `msg` as a reply to a message by `author_id`.
pub(crate) fn replying_to(mut msg: IncomingMessage, author_id: i64, author_is_bot: bool) -> IncomingMessage {
    msg.reply_to = Some(RepliedMessage {
        author_id: Some(author_id),
        author_is_bot,
    });
    msg
}

pub(crate) fn update(update_id: u32, msg: IncomingMessage) -> InboundUpdate {
    InboundUpdate {
        update_id,
        message: Some(msg),
    }
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
