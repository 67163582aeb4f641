//! Prefix watches.

use super::Client;
use crate::core::error::LeaseholdResult;
use crate::store::{EventType, KeyRange, WatchStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A change under a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: String,
    /// New value for `Put`, empty for `Delete`.
    pub value: String,
    pub event_type: EventType,
}

impl From<crate::store::WatchEvent> for WatchEvent {
    fn from(event: crate::store::WatchEvent) -> Self {
        Self {
            key: String::from_utf8_lossy(&event.kv.key).into_owned(),
            value: String::from_utf8_lossy(&event.kv.value).into_owned(),
            event_type: event.event_type,
        }
    }
}

/// Stream of events under a prefix. Dropping it cancels the watch.
#[derive(Debug)]
pub struct WatchSubscription {
    stream: WatchStream,
}

impl WatchSubscription {
    /// Next event; `None` once the store ends the watch.
    ///
    /// Non UTF-8 bytes in keys or values are replaced lossily.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.stream.next().await.map(WatchEvent::from)
    }
}

/// Background task forwarding a watch into caller channels.
#[derive(Debug)]
pub struct WatchHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Whether the forwarding task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop forwarding and wait for the task to exit.
    pub async fn cancel(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Client {
    /// Watch every key starting with `prefix`, from now on.
    pub async fn watch_prefix(&self, prefix: &str) -> LeaseholdResult<WatchSubscription> {
        let stream = self
            .call("watch", self.store.watch(KeyRange::prefix(prefix)))
            .await?;
        tracing::debug!(prefix = %prefix, "watch started");
        Ok(WatchSubscription { stream })
    }

    /// Watch `prefix` and fan each event out over three parallel channels:
    /// key, value and event type (`"PUT"` / `"DELETE"`).
    ///
    /// Forwarding stops when the handle is cancelled or dropped, when any
    /// receiver is dropped, or when the store ends the watch.
    pub async fn watch_prefix_into(
        &self,
        prefix: &str,
        keys: mpsc::Sender<String>,
        values: mpsc::Sender<String>,
        types: mpsc::Sender<String>,
    ) -> LeaseholdResult<WatchHandle> {
        let mut subscription = self.watch_prefix(prefix).await?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let prefix = prefix.to_string();

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    event = subscription.next() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let forward = async {
                    keys.send(event.key).await.is_ok()
                        && values.send(event.value).await.is_ok()
                        && types.send(event.event_type.to_string()).await.is_ok()
                };
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    delivered = forward => if !delivered { break },
                }
            }
            tracing::debug!(prefix = %prefix, "watch forwarding stopped");
        });

        Ok(WatchHandle {
            shutdown_tx,
            task: Some(task),
        })
    }
}
