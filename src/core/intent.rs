use std::collections::HashMap;
use tokio::time::Instant;

use super::ChannelId;

/// Channels whose closure the user caused (explicit disconnect, typed exit,
/// EOF). Each entry is consumed by the first `closed` event for its channel.
///
/// Entries from typed keystrokes carry a deadline: an `exit` that only left a
/// nested shell must not turn a much later drop into a user-initiated close.
#[derive(Debug, Default)]
pub struct IntentionalDisconnects {
    channels: HashMap<ChannelId, Option<Instant>>,
}

impl IntentionalDisconnects {
    /// Records an intent that holds until the next `closed` event.
    pub fn insert(&mut self, channel_id: ChannelId) -> bool {
        self.channels.insert(channel_id, None).is_none()
    }

    /// Records an intent that lapses after `deadline`. Never shortens an
    /// intent that is already recorded.
    pub fn insert_until(&mut self, channel_id: ChannelId, deadline: Instant) {
        let entry = self.channels.entry(channel_id).or_insert(Some(deadline));
        if let Some(current) = entry {
            *current = (*current).max(deadline);
        }
    }

    /// Removes the entry; `true` if the closure was intentional.
    pub fn take(&mut self, channel_id: &ChannelId) -> bool {
        match self.channels.remove(channel_id) {
            Some(None) => true,
            Some(Some(deadline)) => Instant::now() <= deadline,
            None => false,
        }
    }

    pub fn contains(&self, channel_id: &ChannelId) -> bool {
        match self.channels.get(channel_id) {
            Some(None) => true,
            Some(Some(deadline)) => Instant::now() <= *deadline,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn entries_are_consumed_once() {
        let mut intents = IntentionalDisconnects::default();
        let channel = ChannelId::from("ch-1");
        assert!(intents.insert(channel.clone()));
        assert!(intents.contains(&channel));

        assert!(intents.take(&channel));
        assert!(!intents.take(&channel));
        assert!(intents.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_entries_lapse() {
        let mut intents = IntentionalDisconnects::default();
        let channel = ChannelId::from("ch-1");
        intents.insert_until(channel.clone(), Instant::now() + Duration::from_secs(5));
        assert!(intents.contains(&channel));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!intents.contains(&channel));
        assert!(!intents.take(&channel));
        assert!(intents.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_entry_never_weakens_a_standing_one() {
        let mut intents = IntentionalDisconnects::default();
        let channel = ChannelId::from("ch-1");
        intents.insert(channel.clone());
        intents.insert_until(channel.clone(), Instant::now() + Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(intents.take(&channel));
    }
}
