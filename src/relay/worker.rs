use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};
use crate::telegram::OutgoingMessage;

use super::{ChatTask, Relay};

impl Relay {
    /// Spawn the single worker that drains the task queue. Fails if a worker
    /// was already started for this relay.
    pub fn start_worker_loop(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let rx = self
            .queue_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RelayError::Relay("worker loop already started".into()))?;

        let relay = self.clone();
        Ok(tokio::spawn(async move { relay.worker_loop(rx).await }))
    }

    async fn worker_loop(self: Arc<Self>, mut rx: mpsc::Receiver<ChatTask>) {
        info!("worker loop started");
        loop {
            tokio::select! {
                task = rx.recv() => match task {
                    Some(task) => self.process(task).await,
                    None => {
                        info!("task queue closed, worker stopping");
                        return;
                    }
                },
                _ = tokio::time::sleep(self.settings.idle_tick) => {
                    debug!("worker idle");
                }
            }
        }
    }

    /// Answer one task. The session ends when `task` is dropped on return.
    async fn process(&self, mut task: ChatTask) {
        debug!(user_id = task.from, chat_id = task.chat_id, "processing question");

        let answered = match self.completion.complete(&task.question).await {
            Ok(answer) => {
                task.answer = answer;
                if let Some(quota) = &self.quota {
                    quota.charge(task.from).await;
                }
                true
            }
            Err(e) => {
                warn!(user_id = task.from, err = %e, "completion failed");
                task.answer = e.to_string();
                false
            }
        };

        // Error text is raw service output and goes out without markup.
        let mut reply =
            OutgoingMessage::new(task.chat_id, task.answer.as_str()).reply_to(task.message_id);
        if answered {
            reply = reply.markdown();
        }

        let result = match self.platform.send_message(&reply).await {
            Err(e) if reply.parse_mode.is_some() => {
                warn!(
                    user_id = task.from,
                    chat_id = task.chat_id,
                    err = %e,
                    "markdown answer rejected, resending as plain text"
                );
                reply.parse_mode = None;
                self.platform.send_message(&reply).await
            }
            other => other,
        };

        match result {
            Ok(()) => info!(
                user_id = task.from,
                chat_id = task.chat_id,
                answer_len = task.answer.len(),
                "answer delivered"
            ),
            Err(e) => error!(
                user_id = task.from,
                chat_id = task.chat_id,
                err = %e,
                "failed to deliver answer"
            ),
        }
    }
}
