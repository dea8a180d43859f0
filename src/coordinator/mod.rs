//! The session coordinator: one actor task that owns every tab, channel,
//! reconnect timer and file-browser lock, and a cheap `Clone` handle that
//! talks to it.

mod actor;
mod files;
mod message;

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use self::actor::Actor;
use self::message::{ListTarget, Message};
use crate::core::state::TabSnapshot;
use crate::core::{ChannelId, TabId, TerminalSize};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::notify::NotificationSink;
use crate::output::{OutputBuffers, OutputCallback, extract_last_block};
use crate::session::SessionDescriptor;
use crate::settings::CoordinatorSettings;
use crate::sftp::{DirectoryListing, FileOpOutcome, FileOperation};
use crate::transport::{Transport, TransportEventReceiver};

/// Handle to a running coordinator.
///
/// Every method enqueues a request for the actor and waits for its answer.
/// Requests that start transport work (connect, listings, file operations)
/// resolve once that work has settled. Once the actor has stopped, every
/// request fails with [`CoordinatorError::Shutdown`].
#[derive(Clone)]
pub struct Coordinator {
    inbox: mpsc::UnboundedSender<Message>,
    buffers: Arc<Mutex<OutputBuffers>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("running", &!self.inbox.is_closed())
            .finish()
    }
}

impl Coordinator {
    /// Starts the actor on the current tokio runtime.
    ///
    /// `events` is the transport's `output`/`closed` stream; the coordinator
    /// is its only consumer.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        events: TransportEventReceiver,
        sink: Arc<dyn NotificationSink>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (inbox, receiver) = mpsc::unbounded_channel();
        let buffers = Arc::new(Mutex::new(OutputBuffers::new(
            settings.output_buffer_max_bytes,
        )));
        let actor = Actor::new(
            transport,
            inbox.downgrade(),
            sink,
            buffers.clone(),
            &settings,
        );
        tokio::spawn(actor.run(receiver, events));
        tracing::info!("session coordinator started");

        Self { inbox, buffers }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> CoordinatorResult<T> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(build(reply))
            .map_err(|_| CoordinatorError::Shutdown)?;
        response.await.map_err(|_| CoordinatorError::Shutdown)
    }

    // Tabs

    pub async fn open_tab(&self, title: impl Into<String>) -> CoordinatorResult<TabId> {
        let title = title.into();
        self.request(|reply| Message::OpenTab { title, reply }).await
    }

    /// Unsubscribes output, disarms auto-reconnect, disconnects the bound
    /// channel and forgets the tab and its buffer.
    pub async fn close_tab(&self, tab_id: TabId) -> CoordinatorResult<()> {
        self.request(|reply| Message::CloseTab { tab_id, reply }).await?
    }

    pub async fn tab_snapshot(&self, tab_id: TabId) -> CoordinatorResult<Option<TabSnapshot>> {
        self.request(|reply| Message::Snapshot { tab_id, reply }).await
    }

    // Connection lifecycle

    /// Connects `tab_id`, replacing any channel still bound to it. Returns the
    /// new channel, or `None` if the attempt failed (already reported through
    /// the notification sink) or was superseded by a newer one.
    pub async fn connect(
        &self,
        tab_id: TabId,
        descriptor: SessionDescriptor,
        size: TerminalSize,
    ) -> CoordinatorResult<Option<ChannelId>> {
        self.request(|reply| Message::Connect {
            tab_id,
            descriptor,
            size,
            reply,
        })
        .await?
    }

    /// Connects again with the tab's last descriptor and geometry.
    pub async fn reconnect(&self, tab_id: TabId) -> CoordinatorResult<Option<ChannelId>> {
        self.request(|reply| Message::Reconnect { tab_id, reply }).await?
    }

    /// Marks the tab disconnected right away and asks the transport to close
    /// the channel. Also disarms auto-reconnect.
    pub async fn disconnect(
        &self,
        tab_id: TabId,
        channel: Option<ChannelId>,
    ) -> CoordinatorResult<()> {
        self.request(|reply| Message::Disconnect {
            tab_id,
            channel,
            reply,
        })
        .await?
    }

    pub async fn send_input(
        &self,
        tab_id: TabId,
        data: impl Into<Vec<u8>>,
    ) -> CoordinatorResult<()> {
        let data = data.into();
        self.request(|reply| Message::SendInput {
            tab_id,
            data,
            reply,
        })
        .await?
    }

    pub async fn resize(&self, tab_id: TabId, size: TerminalSize) -> CoordinatorResult<()> {
        self.request(|reply| Message::Resize {
            tab_id,
            size,
            reply,
        })
        .await?
    }

    // Output

    /// Last writer wins: returns `true` if a previous callback was replaced.
    pub async fn subscribe_output(
        &self,
        channel: ChannelId,
        on_data: OutputCallback,
    ) -> CoordinatorResult<bool> {
        self.request(|reply| Message::Subscribe {
            channel,
            on_data,
            reply,
        })
        .await
    }

    pub async fn unsubscribe_output(&self, channel: ChannelId) -> CoordinatorResult<bool> {
        self.request(|reply| Message::Unsubscribe { channel, reply }).await
    }

    /// Appends to the tab's transcript. Output for a tab that is not open
    /// (or already closed) is dropped.
    pub fn append_buffer(&self, tab_id: TabId, chunk: &str) {
        if !self.buffers.lock().append(tab_id, chunk) {
            tracing::trace!("dropping output for closed {}", tab_id);
        }
    }

    pub fn buffer(&self, tab_id: TabId) -> Option<String> {
        self.buffers.lock().get(tab_id).map(str::to_string)
    }

    /// Size a buffer is cut down to once it grows past the cap.
    pub fn trimmed_size(&self) -> usize {
        self.buffers.lock().trimmed_size()
    }

    /// Best-effort "copy last block" over the tab's buffered transcript.
    pub fn last_block(&self, tab_id: TabId) -> Option<String> {
        let buffers = self.buffers.lock();
        let text = buffers.get(tab_id)?;
        let lines: Vec<&str> = text.lines().collect();
        Some(extract_last_block(&lines))
    }

    // Auto-reconnect

    pub async fn arm_auto_reconnect(
        &self,
        tab_id: TabId,
        descriptor: SessionDescriptor,
        size: TerminalSize,
        on_output: OutputCallback,
    ) -> CoordinatorResult<()> {
        self.request(|reply| Message::ArmAutoReconnect {
            tab_id,
            descriptor,
            size,
            on_output,
            reply,
        })
        .await?
    }

    pub async fn disarm_auto_reconnect(&self, tab_id: TabId) -> CoordinatorResult<bool> {
        self.request(|reply| Message::DisarmAutoReconnect { tab_id, reply }).await
    }

    /// The next `closed` event for the channel (the tab's bound channel if
    /// `channel` is `None`) will not trigger a reconnect.
    pub async fn mark_intentional_exit(
        &self,
        tab_id: TabId,
        channel: Option<ChannelId>,
    ) -> CoordinatorResult<Option<ChannelId>> {
        self.request(|reply| Message::MarkIntentionalExit {
            tab_id,
            channel,
            reply,
        })
        .await
    }

    // Remote file browser

    pub async fn list_directory(
        &self,
        channel: ChannelId,
        path: impl Into<String>,
        skip_debounce: bool,
    ) -> CoordinatorResult<FileOpOutcome> {
        let target = ListTarget::Path {
            path: path.into(),
            skip_debounce,
        };
        self.list(channel, target).await
    }

    /// Re-lists the current directory, ignoring the debounce window.
    pub async fn refresh_directory(&self, channel: ChannelId) -> CoordinatorResult<FileOpOutcome> {
        self.list(channel, ListTarget::Refresh).await
    }

    pub async fn navigate_into(
        &self,
        channel: ChannelId,
        path: impl Into<String>,
    ) -> CoordinatorResult<FileOpOutcome> {
        self.list(channel, ListTarget::Into(path.into())).await
    }

    pub async fn navigate_up(&self, channel: ChannelId) -> CoordinatorResult<FileOpOutcome> {
        self.list(channel, ListTarget::Up).await
    }

    pub async fn navigate_back(&self, channel: ChannelId) -> CoordinatorResult<FileOpOutcome> {
        self.list(channel, ListTarget::Back).await
    }

    pub async fn directory_listing(
        &self,
        channel: ChannelId,
    ) -> CoordinatorResult<Option<DirectoryListing>> {
        self.request(|reply| Message::Listing { channel, reply }).await
    }

    async fn list(
        &self,
        channel: ChannelId,
        target: ListTarget,
    ) -> CoordinatorResult<FileOpOutcome> {
        self.request(|reply| Message::List {
            channel,
            target,
            reply,
        })
        .await
    }

    pub async fn mkdir(
        &self,
        channel: ChannelId,
        path: impl Into<String>,
    ) -> CoordinatorResult<FileOpOutcome> {
        let path = path.into();
        self.run_file_operation(channel, FileOperation::Mkdir { path }).await
    }

    pub async fn touch(
        &self,
        channel: ChannelId,
        path: impl Into<String>,
    ) -> CoordinatorResult<FileOpOutcome> {
        let path = path.into();
        self.run_file_operation(channel, FileOperation::Touch { path }).await
    }

    pub async fn delete(
        &self,
        channel: ChannelId,
        path: impl Into<String>,
        recursive: bool,
    ) -> CoordinatorResult<FileOpOutcome> {
        let path = path.into();
        self.run_file_operation(channel, FileOperation::Delete { path, recursive }).await
    }

    pub async fn rename(
        &self,
        channel: ChannelId,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> CoordinatorResult<FileOpOutcome> {
        let operation = FileOperation::Rename {
            from: from.into(),
            to: to.into(),
        };
        self.run_file_operation(channel, operation).await
    }

    pub async fn upload(
        &self,
        channel: ChannelId,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
    ) -> CoordinatorResult<FileOpOutcome> {
        let operation = FileOperation::Upload {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        };
        self.run_file_operation(channel, operation).await
    }

    pub async fn download(
        &self,
        channel: ChannelId,
        remote_path: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> CoordinatorResult<FileOpOutcome> {
        let operation = FileOperation::Download {
            remote_path: remote_path.into(),
            local_path: local_path.into(),
        };
        self.run_file_operation(channel, operation).await
    }

    /// Runs `operation` under the channel's single-flight lock. Everything but
    /// a download is followed by a re-listing of the current directory.
    pub async fn run_file_operation(
        &self,
        channel: ChannelId,
        operation: FileOperation,
    ) -> CoordinatorResult<FileOpOutcome> {
        self.request(|reply| Message::Operate {
            channel,
            operation,
            reply,
        })
        .await
    }

    /// Cancels all reconnect timers, drops every output subscription and
    /// disconnects every bound channel, then stops the actor.
    pub async fn shutdown(&self) -> CoordinatorResult<()> {
        self.request(|reply| Message::Shutdown { reply }).await
    }
}
