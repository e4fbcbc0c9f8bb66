use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::telegram::InboundUpdate;

use super::Relay;

/// Updates buffered between the poller and the fetch loop.
const UPDATE_BUFFER: usize = 100;

impl Relay {
    /// Spawn the update fetch loop. It runs for the life of the process.
    pub fn start_fetch_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move { relay.fetch_loop().await })
    }

    async fn fetch_loop(self: Arc<Self>) {
        info!(
            offset = self.offset(),
            poll_timeout_secs = self.settings.poll_timeout_secs,
            "fetch loop started"
        );
        let mut updates = self.open_update_stream();

        loop {
            tokio::select! {
                next = updates.recv() => match next {
                    Some(update) => {
                        let relay = self.clone();
                        tokio::spawn(async move { relay.handle_update(update).await });
                    }
                    None => {
                        warn!(offset = self.offset(), "update stream closed, reopening");
                        updates = self.open_update_stream();
                    }
                },
                _ = tokio::time::sleep(self.settings.idle_tick) => {
                    debug!("fetch loop idle");
                }
            }
        }
    }

    /// Start long-polling from the current offset. The stream ends after the
    /// first failed poll.
    fn open_update_stream(self: &Arc<Self>) -> mpsc::Receiver<InboundUpdate> {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let relay = self.clone();

        tokio::spawn(async move {
            loop {
                let offset = relay.offset();
                let batch = match relay
                    .platform
                    .fetch_updates(offset, relay.settings.poll_timeout_secs)
                    .await
                {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(offset, err = %e, "fetching updates failed");
                        tokio::time::sleep(relay.settings.stream_retry).await;
                        return;
                    }
                };

                for update in batch {
                    let next = i32::try_from(update.update_id)
                        .unwrap_or(i32::MAX)
                        .saturating_add(1);
                    relay.offset.fetch_max(next, Ordering::SeqCst);
                    if tx.send(update).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }
}
