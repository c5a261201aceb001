//! Notification fan-out bus (spec §4.6 `AddNotificationHandler`): "All
//! registered handlers receive every notification... best-effort and
//! non-blocking — slow handlers must self-buffer" (spec §5). Grounded on the
//! teacher's `ratchet_resilience::shutdown::ShutdownCoordinator`'s use of
//! `tokio::sync::broadcast` for fan-out, adapted to per-handler bounded
//! mpsc channels so one slow handler cannot starve the others of capacity.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::transport::UpstreamNotification;

const HANDLER_BUFFER: usize = 64;

pub struct NotificationBus {
    handlers: tokio::sync::RwLock<Vec<mpsc::Sender<UpstreamNotification>>>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            handlers: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler, returning the receiving end of its dedicated
    /// buffer. Delivery order across handlers is unspecified; within one
    /// handler, upstream order is preserved (spec §5).
    pub async fn add_handler(&self) -> mpsc::Receiver<UpstreamNotification> {
        let (tx, rx) = mpsc::channel(HANDLER_BUFFER);
        self.handlers.write().await.push(tx);
        rx
    }

    /// Delivers to every handler at most once; a full handler buffer drops
    /// the notification for that handler with a warning, never blocks the
    /// caller.
    pub async fn publish(&self, notification: UpstreamNotification) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if handler.try_send(notification.clone()).is_err() {
                warn!("notification handler buffer full or closed, dropping notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_handler_receives_every_notification() {
        let bus = Arc::new(NotificationBus::new());
        let mut rx1 = bus.add_handler().await;
        let mut rx2 = bus.add_handler().await;

        bus.publish(UpstreamNotification::ToolListChanged {
            server: "gh".into(),
        })
        .await;

        assert!(matches!(
            rx1.recv().await,
            Some(UpstreamNotification::ToolListChanged { .. })
        ));
        assert!(matches!(
            rx2.recv().await,
            Some(UpstreamNotification::ToolListChanged { .. })
        ));
    }
}
