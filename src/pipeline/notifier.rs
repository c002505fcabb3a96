// src/pipeline/notifier.rs
//
// Fan-out of server events to every connected client. Delivery is best
// effort: a subscriber whose receiving side is gone is removed and the rest
// still get the event.

use crate::events::ServerEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type EventReceiver = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Arc<ServerEvent>>,
}

#[derive(Clone, Default)]
pub struct Notifier {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber { id, tx });
        debug!("Subscriber {} connected", id);
        rx
    }

    /// Send to a single fresh receiver without touching the others.
    pub fn subscribe_with(&self, first: ServerEvent) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // A receiver we still hold cannot be closed
        let _ = tx.send(Arc::new(first));
        self.lock().push(Subscriber { id, tx });
        debug!("Subscriber {} connected", id);
        rx
    }

    /// Returns the number of subscribers that received the event.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|s| match s.tx.send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(_) => {
                warn!("Subscriber {} gone, dropping it", s.id);
                false
            }
        });
        let failed = before - subs.len();
        if failed > 0 {
            self.dropped.fetch_add(failed as u64, Ordering::Relaxed);
        }
        debug!("Broadcast {} to {} subscriber(s)", event.name(), subs.len());
        subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        // Poisoning cannot leave the list half-updated
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AppData, RemovePayload};

    fn remove(id: &str) -> ServerEvent {
        ServerEvent::RemoveNoHelmetViolation(RemovePayload { id: id.into() })
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let notifier = Notifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_eq!(notifier.broadcast(remove("x")), 2);
        assert_eq!(a.recv().await.unwrap().object_id(), Some("x"));
        assert_eq!(b.recv().await.unwrap().object_id(), Some("x"));
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let notifier = Notifier::new();
        let mut alive = notifier.subscribe();
        let gone = notifier.subscribe();
        drop(gone);

        assert_eq!(notifier.broadcast(remove("1")), 1);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(notifier.dropped_count(), 1);
        assert_eq!(alive.recv().await.unwrap().object_id(), Some("1"));
    }

    #[tokio::test]
    async fn test_subscribe_with_initial_event() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe_with(ServerEvent::AppData(AppData::default()));
        notifier.broadcast(remove("2"));
        assert_eq!(rx.recv().await.unwrap().name(), "server:app-data");
        assert_eq!(rx.recv().await.unwrap().object_id(), Some("2"));
    }
}
