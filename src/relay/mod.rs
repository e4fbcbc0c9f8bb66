//! The chat relay core: fetch updates, decide which messages to answer,
//! and feed them one at a time to the completion service.
//!
//! ```text
//! fetch loop ──spawn──▶ intake ──▶ gate ──▶ sessions ──▶ queue(1) ──▶ worker
//! ```

mod fetch;
mod gate;
mod intake;
mod quota;
mod session;
mod task;
mod worker;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::config::TelegramConfig;
use crate::llm::CompletionService;
use crate::telegram::commands::CommandDispatcher;
use crate::telegram::{OutgoingMessage, Platform};

pub use gate::MembershipGate;
pub use quota::QuotaLimiter;
pub use session::SessionTracker;
pub use task::ChatTask;

/// At most one task waits while the worker is busy with another.
pub const QUEUE_CAPACITY: usize = 1;

/// Runtime settings the core reads once at construction.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub poll_timeout_secs: u32,
    pub idle_tick: Duration,
    /// Pause before a failed update stream is reopened.
    pub stream_retry: Duration,
    pub channel_name: String,
    pub group_name: String,
}

impl RelaySettings {
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            poll_timeout_secs: config.poll_timeout_secs,
            idle_tick: Duration::from_secs(config.idle_tick_secs),
            stream_retry: Duration::from_secs(config.stream_retry_secs),
            channel_name: config.channel_name.clone(),
            group_name: config.group_name.clone(),
        }
    }
}

/// Shared state of one running relay. Built once at startup and shared by
/// `Arc` between the fetch loop, the update handlers and the worker.
pub struct Relay {
    platform: Arc<dyn Platform>,
    completion: Arc<dyn CompletionService>,
    commands: Arc<dyn CommandDispatcher>,
    quota: Option<QuotaLimiter>,
    gate: MembershipGate,
    sessions: SessionTracker,
    settings: RelaySettings,
    /// Next `update_id` to request.
    offset: AtomicI32,
    queue_tx: mpsc::Sender<ChatTask>,
    /// Taken by the worker when it starts.
    queue_rx: StdMutex<Option<mpsc::Receiver<ChatTask>>>,
}

impl Relay {
    pub fn new(
        platform: Arc<dyn Platform>,
        completion: Arc<dyn CompletionService>,
        commands: Arc<dyn CommandDispatcher>,
        settings: RelaySettings,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let gate = MembershipGate::new(
            platform.clone(),
            settings.channel_name.clone(),
            settings.group_name.clone(),
        );
        Self {
            platform,
            completion,
            commands,
            quota: None,
            gate,
            sessions: SessionTracker::new(),
            settings,
            offset: AtomicI32::new(0),
            queue_tx,
            queue_rx: StdMutex::new(Some(queue_rx)),
        }
    }

    pub fn with_quota(mut self, quota: QuotaLimiter) -> Self {
        self.quota = Some(quota);
        self
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn offset(&self) -> i32 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Send and log on failure; the relay never stops over a failed send.
    async fn send(&self, msg: &OutgoingMessage) {
        if let Err(e) = self.platform.send_message(msg).await {
            warn!(chat_id = msg.chat_id, err = %e, "failed to send message");
        }
    }
}
