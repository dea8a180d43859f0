use std::collections::HashMap;

use super::{ChannelId, TabId};

/// Live channel ids and the tab that owns each one.
///
/// Unknown channels are never an error: a `closed` event for a channel that is
/// no longer registered means it was already cleaned up.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    owners: HashMap<ChannelId, TabId>,
}

impl ChannelRegistry {
    pub fn register(&mut self, tab_id: TabId, channel_id: ChannelId) {
        if let Some(previous) = self.owners.insert(channel_id.clone(), tab_id) {
            if previous != tab_id {
                tracing::warn!(
                    "channel {} moved from {} to {}",
                    channel_id,
                    previous,
                    tab_id
                );
            }
        }
    }

    pub fn unregister(&mut self, channel_id: &ChannelId) -> Option<TabId> {
        self.owners.remove(channel_id)
    }

    pub fn tab_for(&self, channel_id: &ChannelId) -> Option<TabId> {
        self.owners.get(channel_id).copied()
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.owners.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TabAllocator;

    #[test]
    fn register_and_lookup_round_trip() {
        let mut tabs = TabAllocator::new();
        let tab = tabs.allocate();
        let mut registry = ChannelRegistry::default();

        registry.register(tab, ChannelId::from("ch-1"));
        assert_eq!(registry.tab_for(&ChannelId::from("ch-1")), Some(tab));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.unregister(&ChannelId::from("ch-1")), Some(tab));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_unknown_channel_is_a_no_op() {
        let mut registry = ChannelRegistry::default();
        assert_eq!(registry.unregister(&ChannelId::from("missing")), None);
        assert_eq!(registry.tab_for(&ChannelId::from("missing")), None);
    }
}
