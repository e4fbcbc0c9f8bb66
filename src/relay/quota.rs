use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::flags::RuntimeFlags;
use crate::users::UserRepository;

/// Per-user remaining-count enforcement, active only while the limiter flag
/// is on.
pub struct QuotaLimiter {
    users: Arc<UserRepository>,
    flags: Arc<RuntimeFlags>,
}

impl QuotaLimiter {
    pub fn new(users: Arc<UserRepository>, flags: Arc<RuntimeFlags>) -> Self {
        Self { users, flags }
    }

    /// Whether the user may ask another question. Creates the user record on
    /// first contact.
    pub async fn admit(&self, user_id: i64, user_name: &str) -> Result<bool> {
        if !self.flags.limiter_enabled() {
            return Ok(true);
        }
        let user = self.users.get_or_init(user_id, user_name).await?;
        debug!(user_id, remain_count = user.remain_count, "quota checked");
        Ok(user.remain_count > 0)
    }

    /// Take one unit for a completed answer.
    pub async fn charge(&self, user_id: i64) {
        if !self.flags.limiter_enabled() {
            return;
        }
        match self.users.consume_one(user_id).await {
            Ok(true) => {}
            Ok(false) => debug!(user_id, "nothing left to charge"),
            Err(e) => warn!(user_id, err = %e, "failed to charge quota"),
        }
    }
}
