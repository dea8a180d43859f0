use chrono::{DateTime, Utc};

use super::{ChannelId, TabId, TerminalSize};
use crate::session::SessionDescriptor;
use crate::terminal::{ExitCommandDetector, InputSignal};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabSnapshot {
    pub tab_id: TabId,
    pub title: String,
    pub status: ConnectionStatus,
    pub channel: Option<ChannelId>,
    pub descriptor: Option<SessionDescriptor>,
    pub size: TerminalSize,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Lifecycle of one tab: idle -> connecting -> connected -> disconnected/error.
///
/// Every connect attempt gets a new generation; a transport result carrying an
/// older generation belongs to an attempt that was superseded or cancelled.
#[derive(Debug)]
pub struct TabState {
    id: TabId,
    title: String,
    status: ConnectionStatus,
    channel: Option<ChannelId>,
    descriptor: Option<SessionDescriptor>,
    size: TerminalSize,
    connected_at: Option<DateTime<Utc>>,
    generation: u64,
    input: ExitCommandDetector,
}

impl TabState {
    pub fn new(id: TabId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: ConnectionStatus::Idle,
            channel: None,
            descriptor: None,
            size: TerminalSize::default(),
            connected_at: None,
            generation: 0,
            input: ExitCommandDetector::new(),
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn channel(&self) -> Option<&ChannelId> {
        self.channel.as_ref()
    }

    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn size(&self) -> TerminalSize {
        self.size
    }

    pub fn set_size(&mut self, size: TerminalSize) {
        self.size = size;
    }

    /// Enters `Connecting`. The caller must have released any bound channel.
    pub fn begin_connect(&mut self, descriptor: SessionDescriptor, size: TerminalSize) -> u64 {
        debug_assert!(self.channel.is_none(), "connect with a channel still bound");
        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        self.descriptor = Some(descriptor);
        self.size = size;
        self.connected_at = None;
        self.input.reset();
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn connected(&mut self, channel: ChannelId) {
        self.status = ConnectionStatus::Connected;
        self.channel = Some(channel);
        self.connected_at = Some(Utc::now());
    }

    pub fn failed(&mut self, message: impl Into<String>) {
        self.status = ConnectionStatus::Error(message.into());
        self.channel = None;
        self.connected_at = None;
    }

    /// Handles a `closed` notification. Returns `false` if `channel` is not
    /// the one bound to this tab.
    pub fn channel_closed(&mut self, channel: &ChannelId) -> bool {
        if self.channel.as_ref() != Some(channel) {
            return false;
        }
        self.channel = None;
        self.status = ConnectionStatus::Disconnected;
        self.connected_at = None;
        true
    }

    /// User-requested disconnect. Also cancels a connect that is in flight.
    pub fn disconnect(&mut self) -> Option<ChannelId> {
        self.generation += 1;
        self.status = ConnectionStatus::Disconnected;
        self.connected_at = None;
        self.channel.take()
    }

    pub fn feed_input(&mut self, data: &[u8]) -> InputSignal {
        self.input.feed(data)
    }

    pub fn snapshot(&self) -> TabSnapshot {
        TabSnapshot {
            tab_id: self.id,
            title: self.title.clone(),
            status: self.status.clone(),
            channel: self.channel.clone(),
            descriptor: self.descriptor.clone(),
            size: self.size,
            connected_at: self.connected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TabAllocator;

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor::new(
            "web".to_string(),
            "web.example.com".to_string(),
            22,
            "deploy".to_string(),
        )
    }

    fn tab() -> TabState {
        TabState::new(TabAllocator::new().allocate(), "web")
    }

    #[test]
    fn connect_success_path() {
        let mut tab = tab();
        assert_eq!(tab.status(), &ConnectionStatus::Idle);

        let generation = tab.begin_connect(descriptor(), TerminalSize::new(120, 40));
        assert_eq!(tab.status(), &ConnectionStatus::Connecting);
        assert!(tab.is_current(generation));

        tab.connected(ChannelId::from("ch-1"));
        assert!(tab.status().is_connected());
        assert_eq!(tab.channel(), Some(&ChannelId::from("ch-1")));
        assert!(tab.snapshot().connected_at.is_some());
        assert_eq!(tab.size(), TerminalSize::new(120, 40));
    }

    #[test]
    fn connect_failure_leaves_no_channel() {
        let mut tab = tab();
        tab.begin_connect(descriptor(), TerminalSize::default());
        tab.failed("Connection refused");
        assert_eq!(
            tab.status(),
            &ConnectionStatus::Error("Connection refused".to_string())
        );
        assert!(tab.channel().is_none());
    }

    #[test]
    fn close_of_foreign_channel_is_ignored() {
        let mut tab = tab();
        tab.begin_connect(descriptor(), TerminalSize::default());
        tab.connected(ChannelId::from("ch-2"));

        assert!(!tab.channel_closed(&ChannelId::from("ch-1")));
        assert!(tab.status().is_connected());

        assert!(tab.channel_closed(&ChannelId::from("ch-2")));
        assert_eq!(tab.status(), &ConnectionStatus::Disconnected);
        assert!(tab.channel().is_none());
    }

    #[test]
    fn disconnect_invalidates_in_flight_connect() {
        let mut tab = tab();
        let generation = tab.begin_connect(descriptor(), TerminalSize::default());
        assert_eq!(tab.disconnect(), None);
        assert!(!tab.is_current(generation));
        assert_eq!(tab.status(), &ConnectionStatus::Disconnected);
    }
}
