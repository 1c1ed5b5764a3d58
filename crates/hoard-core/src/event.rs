//! Cache lifecycle notifications over tokio::broadcast
//!
//! The warm-up loader, the refresh scheduler and [`Hoard::clear`](crate::Hoard::clear)
//! publish here. The `watch` command prints refresh summaries from it and
//! tests use it to await cycles instead of sleeping.

use crate::refresh::RefreshReport;
use tokio::sync::broadcast;

/// Events emitted by the cache lifecycle
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// An entity was loaded during warm-up
    Preloaded { entity: String, records: usize },
    /// Warm-up finished
    LoadCompleted,
    /// A refresh cycle finished (possibly with per-entity failures)
    RefreshCompleted(RefreshReport),
    /// One entity could not be refreshed this cycle
    RefreshFailed { entity: String, reason: String },
    /// All indices were cleared
    Cleared,
    /// The refresh scheduler left the Running state
    SchedulerStopped,
}

/// Broadcast channel shared by the loader, the scheduler and the service
///
/// Clones publish into the same channel. A receiver that falls more than
/// `capacity` events behind gets `RecvError::Lagged` and resumes from the
/// oldest retained event.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// 64 events: one per entity per cycle plus the cycle summary
    pub fn default_capacity() -> Self {
        Self::new(64)
    }

    /// Fire and forget; nobody listening is fine
    pub fn publish(&self, event: CacheEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = EventBus::default_capacity();
        let mut rx = bus.subscribe();

        bus.publish(CacheEvent::Preloaded {
            entity: "Element".to_string(),
            records: 118,
        });
        bus.publish(CacheEvent::Cleared);

        let first = rx.recv().await.unwrap();
        assert!(
            matches!(first, CacheEvent::Preloaded { ref entity, records: 118 } if entity == "Element")
        );
        assert!(matches!(rx.recv().await.unwrap(), CacheEvent::Cleared));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::default_capacity();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.publish(CacheEvent::SchedulerStopped);
        assert!(matches!(rx.recv().await.unwrap(), CacheEvent::SchedulerStopped));
    }

    #[test]
    fn test_slow_receiver_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.publish(CacheEvent::LoadCompleted);
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert!(matches!(rx.try_recv(), Ok(CacheEvent::LoadCompleted)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::default().publish(CacheEvent::LoadCompleted);
    }
}
