use std::sync::Arc;

use tracing::{debug, warn};

use crate::telegram::Platform;

/// Requires private-chat users to belong to both a channel and a group.
pub struct MembershipGate {
    platform: Arc<dyn Platform>,
    channel: String,
    group: String,
}

impl MembershipGate {
    pub fn new(platform: Arc<dyn Platform>, channel: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            platform,
            channel: channel.into(),
            group: group.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Both lookups are always issued; no caching.
    pub async fn passes(&self, user_id: i64) -> bool {
        let (in_channel, in_group) = tokio::join!(
            self.is_member(&self.channel, user_id),
            self.is_member(&self.group, user_id),
        );
        debug!(user_id, in_channel, in_group, "membership checked");
        in_channel && in_group
    }

    /// A failed lookup counts as not a member.
    async fn is_member(&self, chat: &str, user_id: i64) -> bool {
        match self.platform.chat_member_status(chat, user_id).await {
            Ok(status) => status.is_member(),
            Err(e) => {
                warn!(chat, user_id, err = %e, "membership lookup failed");
                false
            }
        }
    }
}
