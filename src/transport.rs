use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use crate::core::{ChannelId, TerminalSize};
use crate::session::SessionDescriptor;
use crate::sftp::DirectoryListing;

/// Asynchronous notifications from the transport, delivered at arbitrary
/// times after a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Output { channel: ChannelId, data: Vec<u8> },
    Closed { channel: ChannelId },
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// The network layer that actually reaches remote hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, descriptor: &SessionDescriptor, size: TerminalSize)
    -> Result<ChannelId>;

    async fn send(&self, channel: &ChannelId, data: &[u8]) -> Result<()>;

    async fn resize(&self, channel: &ChannelId, size: TerminalSize) -> Result<()>;

    async fn disconnect(&self, channel: &ChannelId) -> Result<()>;

    async fn list_dir(&self, channel: &ChannelId, path: &str) -> Result<DirectoryListing>;

    /// Returns the number of bytes written locally.
    async fn download(&self, channel: &ChannelId, remote_path: &str, local_path: &Path)
    -> Result<u64>;

    /// Returns the number of bytes written remotely.
    async fn upload(&self, channel: &ChannelId, local_path: &Path, remote_path: &str)
    -> Result<u64>;

    async fn mkdir(&self, channel: &ChannelId, path: &str) -> Result<()>;

    async fn touch(&self, channel: &ChannelId, path: &str) -> Result<()>;

    async fn delete(&self, channel: &ChannelId, path: &str, recursive: bool) -> Result<()>;

    async fn rename(&self, channel: &ChannelId, from: &str, to: &str) -> Result<()>;
}
