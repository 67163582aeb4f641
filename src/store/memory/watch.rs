//! Watch registry for the in-memory store.

use crate::store::{KeyRange, WatchEvent};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// State for a single watch.
#[derive(Debug)]
struct WatchState {
    range: KeyRange,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

/// Fan-out of state machine events to watchers.
///
/// Watchers whose receiver has been dropped are removed on the next dispatch.
#[derive(Debug, Default)]
pub struct WatchHub {
    watches: HashMap<i64, WatchState>,
    next_watch_id: i64,
}

impl WatchHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watch on `range`.
    pub fn create(&mut self, range: KeyRange) -> (i64, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.next_watch_id += 1;
        let watch_id = self.next_watch_id;
        self.watches.insert(watch_id, WatchState { range, tx });
        (watch_id, rx)
    }

    /// Number of registered watches.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Deliver events to every matching watch, in order.
    pub fn dispatch(&mut self, events: &[WatchEvent]) {
        if events.is_empty() {
            return;
        }

        self.watches.retain(|watch_id, watch| {
            for event in events.iter().filter(|e| watch.range.contains(&e.kv.key)) {
                if watch.tx.send(event.clone()).is_err() {
                    tracing::debug!(watch_id = *watch_id, "watcher dropped, removing");
                    return false;
                }
            }
            !watch.tx.is_closed()
        });
    }
}
