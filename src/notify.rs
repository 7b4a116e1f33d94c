use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ProfileId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for LISTEN/UNLISTEN per host profile.
pub struct NotifyHub {
    channels: DashMap<ProfileId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a profile. Creates the channel if needed.
    pub fn subscribe(&self, profile_id: ProfileId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(profile_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send to the event's profile channel. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.profile_id()) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose last receiver has gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BucketKey, SlotRange};

    fn locked(profile_id: ProfileId) -> Event {
        Event::SlotsLocked {
            profile_id,
            bucket: BucketKey::from("2022-01-01"),
            range: SlotRange::new(0, 3),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(1);

        hub.send(&locked(1));

        let received = rx.recv().await.unwrap();
        assert_eq!(received, locked(1));
    }

    #[tokio::test]
    async fn other_profiles_not_delivered() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(1);
        hub.send(&locked(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&locked(7));
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn prune_drops_dead_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(1);
        let _keep = hub.subscribe(2);
        drop(rx);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }
}
