use super::session::SessionGuard;

/// One admitted question waiting for, or being processed by, the worker.
///
/// Owns the user's session; dropping the task ends the session.
#[derive(Debug)]
pub struct ChatTask {
    pub question: String,
    pub answer: String,
    pub chat_id: i64,
    pub from: i64,
    /// Message the answer replies to.
    pub message_id: i32,
    _session: SessionGuard,
}

impl ChatTask {
    pub fn new(question: impl Into<String>, chat_id: i64, message_id: i32, session: SessionGuard) -> Self {
        Self {
            question: question.into(),
            answer: String::new(),
            chat_id,
            from: session.user_id(),
            message_id,
            _session: session,
        }
    }
}
