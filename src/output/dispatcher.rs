use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::ChannelId;

pub type OutputCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Routes channel output to at most one callback per channel.
///
/// Subscribing again for the same channel replaces the previous callback
/// (last writer wins). Chunks for channels without a subscriber are dropped.
#[derive(Default)]
pub struct OutputDispatcher {
    subscribers: HashMap<ChannelId, OutputCallback>,
}

impl fmt::Debug for OutputDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDispatcher")
            .field("channels", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OutputDispatcher {
    /// Returns `true` when an existing callback was replaced.
    pub fn subscribe(&mut self, channel_id: ChannelId, on_data: OutputCallback) -> bool {
        let replaced = self.subscribers.insert(channel_id.clone(), on_data).is_some();
        if replaced {
            tracing::debug!("output subscriber for channel {} replaced", channel_id);
        }
        replaced
    }

    pub fn unsubscribe(&mut self, channel_id: &ChannelId) -> bool {
        self.subscribers.remove(channel_id).is_some()
    }

    pub fn is_subscribed(&self, channel_id: &ChannelId) -> bool {
        self.subscribers.contains_key(channel_id)
    }

    /// Forwards `data` verbatim. Returns `false` if nobody was listening.
    pub fn dispatch(&self, channel_id: &ChannelId, data: &[u8]) -> bool {
        match self.subscribers.get(channel_id) {
            Some(on_data) => {
                on_data(data);
                true
            }
            None => {
                tracing::trace!(
                    "dropping {} bytes for unsubscribed channel {}",
                    data.len(),
                    channel_id
                );
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (OutputCallback, Arc<Mutex<Vec<u8>>>) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let target = sink.clone();
        let callback: OutputCallback = Arc::new(move |data: &[u8]| {
            target.lock().extend_from_slice(data);
        });
        (callback, sink)
    }

    #[test]
    fn forwards_to_the_registered_callback() {
        let mut dispatcher = OutputDispatcher::default();
        let (callback, received) = recorder();
        dispatcher.subscribe(ChannelId::from("a"), callback);

        assert!(dispatcher.dispatch(&ChannelId::from("a"), b"hello"));
        assert!(!dispatcher.dispatch(&ChannelId::from("b"), b"lost"));
        assert_eq!(received.lock().as_slice(), b"hello");
    }

    #[test]
    fn resubscribe_replaces_previous_callback() {
        let mut dispatcher = OutputDispatcher::default();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        let channel = ChannelId::from("a");

        assert!(!dispatcher.subscribe(channel.clone(), first));
        dispatcher.dispatch(&channel, b"one ");
        assert!(dispatcher.subscribe(channel.clone(), second));
        dispatcher.dispatch(&channel, b"two");

        assert_eq!(first_seen.lock().as_slice(), b"one ");
        assert_eq!(second_seen.lock().as_slice(), b"two");
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn unsubscribed_output_is_dropped() {
        let mut dispatcher = OutputDispatcher::default();
        let (callback, received) = recorder();
        let channel = ChannelId::from("a");
        dispatcher.subscribe(channel.clone(), callback);

        assert!(dispatcher.unsubscribe(&channel));
        assert!(!dispatcher.dispatch(&channel, b"late"));
        assert!(received.lock().is_empty());
        assert!(!dispatcher.unsubscribe(&channel));
    }
}
