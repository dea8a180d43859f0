//! Scripted in-memory transport for coordinator tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::core::{ChannelId, TerminalSize};
use crate::session::SessionDescriptor;
use crate::sftp::{DirectoryListing, FileEntry};
use crate::transport::{Transport, TransportEvent, TransportEventReceiver, TransportEventSender};

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<String>,
    next_channel: u64,
    failures: HashMap<&'static str, VecDeque<String>>,
    sent: HashMap<ChannelId, Vec<u8>>,
    reuse_channel_ids: bool,
}

/// Records every call as a short line such as `list ch-1 /srv` and answers
/// from a script. Call [`FakeTransport::hold`] to park file operations and
/// listings until [`FakeTransport::release`]; connects have their own
/// [`FakeTransport::hold_connects`] gate.
pub(crate) struct FakeTransport {
    events: TransportEventSender,
    state: Mutex<FakeState>,
    gate: watch::Sender<bool>,
    connect_gate: watch::Sender<bool>,
    close_on_disconnect: bool,
}

impl FakeTransport {
    pub(crate) fn new() -> (Arc<Self>, TransportEventReceiver) {
        Self::build(true)
    }

    /// A transport whose `disconnect` never produces a `closed` event.
    pub(crate) fn silent() -> (Arc<Self>, TransportEventReceiver) {
        Self::build(false)
    }

    fn build(close_on_disconnect: bool) -> (Arc<Self>, TransportEventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (gate, _) = watch::channel(false);
        let (connect_gate, _) = watch::channel(false);
        let transport = Arc::new(Self {
            events,
            state: Mutex::new(FakeState::default()),
            gate,
            connect_gate,
            close_on_disconnect,
        });
        (transport, receiver)
    }

    pub(crate) fn fail_next(&self, operation: &'static str, message: &str) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(message.to_string());
    }

    pub(crate) fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn release(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn hold_connects(&self) {
        self.connect_gate.send_replace(true);
    }

    pub(crate) fn release_connects(&self) {
        self.connect_gate.send_replace(false);
    }

    /// Every successful connect after the first hands out the same channel id.
    pub(crate) fn reuse_channel_ids(&self) {
        self.state.lock().reuse_channel_ids = true;
    }

    pub(crate) fn emit_output(&self, channel: &ChannelId, data: &[u8]) {
        let _ = self.events.send(TransportEvent::Output {
            channel: channel.clone(),
            data: data.to_vec(),
        });
    }

    pub(crate) fn emit_closed(&self, channel: &ChannelId) {
        let _ = self.events.send(TransportEvent::Closed {
            channel: channel.clone(),
        });
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub(crate) fn sent(&self, channel: &ChannelId) -> Vec<u8> {
        self.state.lock().sent.get(channel).cloned().unwrap_or_default()
    }

    fn record(&self, operation: &'static str, call: String) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    async fn gate(&self) {
        Self::wait_for(&self.gate).await;
    }

    async fn wait_for(gate: &watch::Sender<bool>) {
        let mut gate = gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;
    }
}

fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(index) => Some(trimmed[..index].to_string()),
        None => None,
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
        size: TerminalSize,
    ) -> Result<ChannelId> {
        tokio::task::yield_now().await;
        Self::wait_for(&self.connect_gate).await;
        self.record(
            "connect",
            format!("connect {} {}x{}", descriptor.host, size.cols, size.rows),
        )?;
        let mut state = self.state.lock();
        if state.next_channel == 0 || !state.reuse_channel_ids {
            state.next_channel += 1;
        }
        Ok(ChannelId::new(format!("ch-{}", state.next_channel)))
    }

    async fn send(&self, channel: &ChannelId, data: &[u8]) -> Result<()> {
        self.record("send", format!("send {channel}"))?;
        self.state
            .lock()
            .sent
            .entry(channel.clone())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    async fn resize(&self, channel: &ChannelId, size: TerminalSize) -> Result<()> {
        self.record("resize", format!("resize {channel} {}x{}", size.cols, size.rows))
    }

    async fn disconnect(&self, channel: &ChannelId) -> Result<()> {
        self.record("disconnect", format!("disconnect {channel}"))?;
        if self.close_on_disconnect {
            self.emit_closed(channel);
        }
        Ok(())
    }

    async fn list_dir(&self, channel: &ChannelId, path: &str) -> Result<DirectoryListing> {
        self.gate().await;
        self.record("list", format!("list {channel} {path}"))?;
        Ok(DirectoryListing {
            current_path: path.to_string(),
            parent_path: parent_of(path),
            entries: vec![FileEntry {
                name: "notes.txt".to_string(),
                path: format!("{}/notes.txt", path.trim_end_matches('/')),
                is_dir: false,
                is_symlink: false,
                size: 42,
                permissions: "-rw-r--r--".to_string(),
                modified: None,
            }],
        })
    }

    async fn download(
        &self,
        channel: &ChannelId,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<u64> {
        self.gate().await;
        self.record(
            "download",
            format!("download {channel} {remote_path} {}", local_path.display()),
        )?;
        Ok(2048)
    }

    async fn upload(
        &self,
        channel: &ChannelId,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<u64> {
        self.gate().await;
        self.record(
            "upload",
            format!("upload {channel} {} {remote_path}", local_path.display()),
        )?;
        Ok(1024)
    }

    async fn mkdir(&self, channel: &ChannelId, path: &str) -> Result<()> {
        self.gate().await;
        self.record("mkdir", format!("mkdir {channel} {path}"))
    }

    async fn touch(&self, channel: &ChannelId, path: &str) -> Result<()> {
        self.gate().await;
        self.record("touch", format!("touch {channel} {path}"))
    }

    async fn delete(&self, channel: &ChannelId, path: &str, recursive: bool) -> Result<()> {
        self.gate().await;
        self.record("delete", format!("delete {channel} {path} recursive={recursive}"))
    }

    async fn rename(&self, channel: &ChannelId, from: &str, to: &str) -> Result<()> {
        self.gate().await;
        self.record("rename", format!("rename {channel} {from} {to}"))
    }
}

/// Lets spawned tasks and the coordinator actor drain their queues.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::parent_of;

    #[test]
    fn parent_paths() {
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("/srv"), Some("/".to_string()));
        assert_eq!(parent_of("/srv/app/"), Some("/srv".to_string()));
    }
}
