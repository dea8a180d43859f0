use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;

use super::message::{ConnectOrigin, ConnectReply, Message};
use crate::core::intent::IntentionalDisconnects;
use crate::core::reconnect::{
    ReconnectConfig, ReconnectPolicy, ReconnectScheduler, RetrySchedule, RetryTicket,
};
use crate::core::registry::ChannelRegistry;
use crate::core::state::{ConnectionStatus, TabState};
use crate::core::{ChannelId, TabAllocator, TabId, TerminalSize};
use crate::error::{ConnectErrorKind, CoordinatorError, CoordinatorResult};
use crate::notify::{NotificationSink, Notifier};
use crate::output::{OutputBuffers, OutputDispatcher};
use crate::session::SessionDescriptor;
use crate::settings::CoordinatorSettings;
use crate::sftp::FileBrowsers;
use crate::terminal::InputSignal;
use crate::transport::{Transport, TransportEvent, TransportEventReceiver};

const WRITE_TIMEOUT: Duration = Duration::from_millis(2000);
/// How long a typed `exit`/`logout`/Ctrl-D keeps the next close intentional.
const TYPED_EXIT_GRACE: Duration = Duration::from_secs(5);
/// Transport events handled back to back before the inbox gets a turn.
const MAX_EVENTS_PER_TURN: usize = 64;

/// Owns every piece of mutable coordinator state. Runs on a single task;
/// transport calls are spawned and report back through the inbox.
pub(super) struct Actor {
    pub(super) transport: Arc<dyn Transport>,
    pub(super) inbox: mpsc::WeakUnboundedSender<Message>,
    pub(super) list_debounce: Duration,
    pub(super) tabs: HashMap<TabId, TabState>,
    pub(super) allocator: TabAllocator,
    pub(super) registry: ChannelRegistry,
    pub(super) intents: IntentionalDisconnects,
    pub(super) dispatcher: OutputDispatcher,
    pub(super) scheduler: ReconnectScheduler,
    pub(super) browsers: FileBrowsers,
    pub(super) writers: HashMap<ChannelId, mpsc::UnboundedSender<Vec<u8>>>,
    /// Connects spawned but not yet finished.
    pub(super) connects_in_flight: usize,
    /// Channels whose `closed` arrived while a connect was in flight.
    /// Emptied once no connect is pending.
    pub(super) early_closes: HashSet<ChannelId>,
    pub(super) buffers: Arc<Mutex<OutputBuffers>>,
    pub(super) notifier: Notifier,
}

impl Actor {
    pub(super) fn new(
        transport: Arc<dyn Transport>,
        inbox: mpsc::WeakUnboundedSender<Message>,
        sink: Arc<dyn NotificationSink>,
        buffers: Arc<Mutex<OutputBuffers>>,
        settings: &CoordinatorSettings,
    ) -> Self {
        Self {
            transport,
            inbox,
            list_debounce: settings.list_debounce(),
            tabs: HashMap::new(),
            allocator: TabAllocator::new(),
            registry: ChannelRegistry::default(),
            intents: IntentionalDisconnects::default(),
            dispatcher: OutputDispatcher::default(),
            scheduler: ReconnectScheduler::new(ReconnectPolicy::from_settings(&settings.reconnect)),
            browsers: FileBrowsers::default(),
            writers: HashMap::new(),
            connects_in_flight: 0,
            early_closes: HashSet::new(),
            buffers,
            notifier: Notifier::new(sink, settings.notification_dedupe()),
        }
    }

    pub(super) async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Message>,
        mut events: TransportEventReceiver,
    ) {
        let mut events_open = true;
        let mut burst = 0;
        loop {
            if burst >= MAX_EVENTS_PER_TURN {
                burst = 0;
                match inbox.try_recv() {
                    Ok(message) => {
                        if self.update(message).is_break() {
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        self.shutdown();
                        break;
                    }
                }
            }
            // Transport events first: a request issued after an event was
            // emitted always observes that event's effects.
            tokio::select! {
                biased;
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        burst += 1;
                        self.handle_transport_event(event);
                    }
                    None => {
                        tracing::warn!("transport event stream ended");
                        events_open = false;
                    }
                },
                message = inbox.recv() => match message {
                    Some(message) => {
                        burst = 0;
                        if self.update(message).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
            }
        }
        tracing::info!("session coordinator stopped");
    }

    /// Spawns `work` and feeds the message it resolves to back into the inbox.
    pub(super) fn perform<F>(&self, work: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let message = work.await;
            let _ = inbox.send(message);
        });
    }

    fn update(&mut self, message: Message) -> ControlFlow<()> {
        tracing::trace!("coordinator message {:?}", message);
        match message {
            Message::OpenTab { title, reply } => {
                let tab_id = self.allocator.allocate();
                self.tabs.insert(tab_id, TabState::new(tab_id, title));
                self.buffers.lock().open(tab_id);
                let _ = reply.send(tab_id);
            }
            Message::CloseTab { tab_id, reply } => {
                let _ = reply.send(self.close_tab(tab_id));
            }
            Message::Snapshot { tab_id, reply } => {
                let _ = reply.send(self.tabs.get(&tab_id).map(TabState::snapshot));
            }
            Message::Connect {
                tab_id,
                descriptor,
                size,
                reply,
            } => self.connect(tab_id, descriptor, size, ConnectOrigin::Manual, Some(reply)),
            Message::Reconnect { tab_id, reply } => self.manual_reconnect(tab_id, reply),
            Message::Disconnect {
                tab_id,
                channel,
                reply,
            } => {
                let _ = reply.send(self.disconnect(tab_id, channel));
            }
            Message::SendInput {
                tab_id,
                data,
                reply,
            } => {
                let _ = reply.send(self.send_input(tab_id, data));
            }
            Message::Resize {
                tab_id,
                size,
                reply,
            } => {
                let _ = reply.send(self.resize(tab_id, size));
            }
            Message::Subscribe {
                channel,
                on_data,
                reply,
            } => {
                let _ = reply.send(self.dispatcher.subscribe(channel, on_data));
            }
            Message::Unsubscribe { channel, reply } => {
                let _ = reply.send(self.dispatcher.unsubscribe(&channel));
            }
            Message::ArmAutoReconnect {
                tab_id,
                descriptor,
                size,
                on_output,
                reply,
            } => {
                let result = if self.tabs.contains_key(&tab_id) {
                    self.scheduler.arm(
                        tab_id,
                        ReconnectConfig {
                            descriptor,
                            size,
                            on_output,
                        },
                    );
                    Ok(())
                } else {
                    Err(CoordinatorError::UnknownTab(tab_id))
                };
                let _ = reply.send(result);
            }
            Message::DisarmAutoReconnect { tab_id, reply } => {
                let _ = reply.send(self.scheduler.disarm(tab_id));
            }
            Message::MarkIntentionalExit {
                tab_id,
                channel,
                reply,
            } => {
                let _ = reply.send(self.mark_intentional_exit(tab_id, channel));
            }
            Message::List {
                channel,
                target,
                reply,
            } => self.list(channel, target, reply),
            Message::Operate {
                channel,
                operation,
                reply,
            } => self.operate(channel, operation, reply),
            Message::Listing { channel, reply } => {
                let listing = self
                    .browsers
                    .get(&channel)
                    .and_then(|browser| browser.listing().cloned());
                let _ = reply.send(listing);
            }
            Message::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
            Message::ConnectFinished {
                tab_id,
                generation,
                origin,
                result,
                reply,
            } => self.connect_finished(tab_id, generation, origin, result, reply),
            Message::RetryFired(ticket) => self.retry_fired(ticket),
            Message::ListingFinished {
                channel,
                path,
                history,
                after,
                result,
                reply,
            } => self.listing_finished(channel, path, history, after, result, reply),
            Message::OperationFinished {
                channel,
                operation,
                result,
                reply,
            } => self.operation_finished(channel, operation, result, reply),
        }
        ControlFlow::Continue(())
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Output { channel, data } => {
                self.dispatcher.dispatch(&channel, &data);
            }
            TransportEvent::Closed { channel } => self.channel_closed(channel),
        }
    }

    fn connect(
        &mut self,
        tab_id: TabId,
        descriptor: SessionDescriptor,
        size: TerminalSize,
        origin: ConnectOrigin,
        reply: Option<ConnectReply>,
    ) {
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            if let Some(reply) = reply {
                let _ = reply.send(Err(CoordinatorError::UnknownTab(tab_id)));
            }
            return;
        };

        let previous = match tab.channel() {
            Some(_) => tab.disconnect(),
            None => None,
        };
        let generation = tab.begin_connect(descriptor.clone(), size);

        if let Some(channel) = previous {
            tracing::info!("{} replacing channel {} before connecting", tab_id, channel);
            self.retire_channel(channel);
        }
        if !matches!(origin, ConnectOrigin::Scheduled { .. }) {
            self.scheduler.cancel_pending(tab_id);
        }

        tracing::info!(
            "{} connecting to {} ({:?})",
            tab_id,
            descriptor.connection_string(),
            origin
        );
        let transport = self.transport.clone();
        self.connects_in_flight += 1;
        self.perform(async move {
            let result = transport
                .connect(&descriptor, size)
                .await
                .map_err(|err| format!("{err:#}"));
            Message::ConnectFinished {
                tab_id,
                generation,
                origin,
                result,
                reply,
            }
        });
    }

    fn manual_reconnect(&mut self, tab_id: TabId, reply: ConnectReply) {
        let Some(tab) = self.tabs.get(&tab_id) else {
            let _ = reply.send(Err(CoordinatorError::UnknownTab(tab_id)));
            return;
        };
        let size = tab.size();
        let descriptor = tab.descriptor().cloned().or_else(|| {
            self.scheduler
                .config(tab_id)
                .map(|config| config.descriptor.clone())
        });
        match descriptor {
            Some(descriptor) => self.connect(
                tab_id,
                descriptor,
                size,
                ConnectOrigin::ManualReconnect,
                Some(reply),
            ),
            None => {
                tracing::debug!("{} has never connected; nothing to reconnect", tab_id);
                let _ = reply.send(Ok(None));
            }
        }
    }

    fn connect_finished(
        &mut self,
        tab_id: TabId,
        generation: u64,
        origin: ConnectOrigin,
        result: Result<ChannelId, String>,
        reply: Option<ConnectReply>,
    ) {
        self.connects_in_flight = self.connects_in_flight.saturating_sub(1);
        let current = self
            .tabs
            .get(&tab_id)
            .is_some_and(|tab| tab.is_current(generation));
        let still_wanted = match origin {
            ConnectOrigin::Scheduled { .. } => self.scheduler.is_armed(tab_id),
            ConnectOrigin::Manual | ConnectOrigin::ManualReconnect => true,
        };

        let outcome = if current && still_wanted {
            match result {
                Ok(channel) => {
                    self.bind_channel(tab_id, channel.clone(), origin);
                    if self.early_closes.remove(&channel) {
                        self.channel_closed(channel);
                        None
                    } else {
                        Some(channel)
                    }
                }
                Err(message) => {
                    self.connect_failed(tab_id, origin, message);
                    None
                }
            }
        } else {
            if current {
                // Auto-reconnect was disarmed while this attempt was in flight.
                if let Some(tab) = self.tabs.get_mut(&tab_id) {
                    tab.disconnect();
                }
            }
            match result {
                Ok(channel) => {
                    tracing::info!(
                        "{} discarding channel {} from a superseded connect",
                        tab_id,
                        channel
                    );
                    if !self.early_closes.remove(&channel) {
                        self.intents.insert(channel.clone());
                        self.request_disconnect(channel);
                    }
                }
                Err(message) => {
                    tracing::debug!("{} superseded connect failed: {}", tab_id, message);
                }
            }
            None
        };

        if self.connects_in_flight == 0 {
            self.early_closes.clear();
        }
        self.reply_connect(reply, outcome);
    }

    fn reply_connect(&self, reply: Option<ConnectReply>, outcome: Option<ChannelId>) {
        if let Some(reply) = reply {
            let _ = reply.send(Ok(outcome));
        }
    }

    fn bind_channel(&mut self, tab_id: TabId, channel: ChannelId, origin: ConnectOrigin) {
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            return;
        };
        tab.connected(channel.clone());
        let title = tab.title().to_string();
        self.registry.register(tab_id, channel.clone());
        tracing::info!("{} connected on channel {}", tab_id, channel);

        if origin.is_reconnect() {
            if let Some(config) = self.scheduler.config(tab_id) {
                self.dispatcher
                    .subscribe(channel.clone(), config.on_output.clone());
            }
            let detail = match origin {
                ConnectOrigin::Scheduled { attempt } => {
                    format!("{title} is back after {attempt} attempt(s)")
                }
                _ => format!("{title} is back"),
            };
            self.notifier.info("Reconnected", &detail);
        }
    }

    fn connect_failed(&mut self, tab_id: TabId, origin: ConnectOrigin, message: String) {
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            return;
        };
        tab.failed(message.clone());
        let title = tab.title().to_string();
        let kind = ConnectErrorKind::classify(&message);
        tracing::warn!("{} connect failed ({:?}): {}", tab_id, kind, message);

        match origin {
            // The next attempt (or the give-up) is what the user hears about.
            ConnectOrigin::Scheduled { attempt } => self.schedule_retry(tab_id, attempt + 1),
            ConnectOrigin::Manual | ConnectOrigin::ManualReconnect => {
                self.notifier
                    .error(kind.title(), &format!("{title}: {message}"));
            }
        }
    }

    fn schedule_retry(&mut self, tab_id: TabId, attempt: u32) {
        let inbox = self.inbox.clone();
        let outcome = self.scheduler.schedule(tab_id, attempt, move |ticket| {
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::RetryFired(ticket));
            }
        });
        let max_attempts = self.scheduler.policy().max_attempts;
        let title = self
            .tabs
            .get(&tab_id)
            .map(|tab| tab.title().to_string())
            .unwrap_or_else(|| tab_id.to_string());

        match outcome {
            RetrySchedule::Scheduled { attempt, delay } => {
                tracing::info!(
                    "{} reconnect attempt {}/{} in {:?}",
                    tab_id,
                    attempt,
                    max_attempts,
                    delay
                );
                self.notifier.info(
                    "Reconnecting",
                    &format!("{title}: attempt {attempt}/{max_attempts} in {delay:?}"),
                );
            }
            RetrySchedule::Exhausted { attempts } => {
                tracing::warn!("{} giving up after {} reconnect attempts", tab_id, attempts);
                if let Some(tab) = self.tabs.get_mut(&tab_id) {
                    tab.failed(format!("Gave up after {attempts} reconnect attempts"));
                }
                self.notifier.error(
                    "Reconnect failed",
                    &format!("{title}: gave up after {attempts} attempts"),
                );
            }
            RetrySchedule::NotArmed => {}
        }
    }

    fn retry_fired(&mut self, ticket: RetryTicket) {
        let Some(config) = self.scheduler.take_fired(&ticket) else {
            tracing::debug!(
                "{} retry {} was cancelled before it fired",
                ticket.tab_id,
                ticket.attempt
            );
            return;
        };
        match self.tabs.get(&ticket.tab_id) {
            Some(tab)
                if tab.channel().is_none() && *tab.status() != ConnectionStatus::Connecting => {}
            _ => {
                tracing::debug!("{} no longer needs a reconnect", ticket.tab_id);
                return;
            }
        }
        self.connect(
            ticket.tab_id,
            config.descriptor,
            config.size,
            ConnectOrigin::Scheduled {
                attempt: ticket.attempt,
            },
            None,
        );
    }

    fn channel_closed(&mut self, channel: ChannelId) {
        let intentional = self.intents.take(&channel);
        self.dispatcher.unsubscribe(&channel);
        self.browsers.remove(&channel);
        self.writers.remove(&channel);

        let Some(tab_id) = self.registry.unregister(&channel) else {
            if !intentional && self.connects_in_flight > 0 {
                // Possibly still on its way back from `connect`.
                self.early_closes.insert(channel);
            } else {
                tracing::debug!("channel {} closed after cleanup", channel);
            }
            return;
        };
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            return;
        };
        if !tab.channel_closed(&channel) {
            return;
        }

        if intentional {
            tracing::info!("{} channel {} closed by user", tab_id, channel);
            self.scheduler.disarm(tab_id);
            return;
        }

        tracing::info!("{} channel {} closed unexpectedly", tab_id, channel);
        if self.scheduler.is_armed(tab_id) {
            self.schedule_retry(tab_id, 1);
        }
    }

    fn disconnect(&mut self, tab_id: TabId, channel: Option<ChannelId>) -> CoordinatorResult<()> {
        let tab = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(CoordinatorError::UnknownTab(tab_id))?;
        let bound = tab.disconnect();
        self.scheduler.disarm(tab_id);

        let mut channels: Vec<ChannelId> = bound.into_iter().collect();
        if let Some(channel) = channel {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        for channel in channels {
            tracing::info!("{} disconnecting channel {}", tab_id, channel);
            self.retire_channel(channel);
        }
        Ok(())
    }

    fn close_tab(&mut self, tab_id: TabId) -> CoordinatorResult<()> {
        let tab = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(CoordinatorError::UnknownTab(tab_id))?;
        let bound = tab.disconnect();

        if let Some(channel) = &bound {
            self.dispatcher.unsubscribe(channel);
        }
        self.scheduler.disarm(tab_id);
        if let Some(channel) = bound {
            self.retire_channel(channel);
        }
        self.tabs.remove(&tab_id);
        self.buffers.lock().remove(tab_id);
        tracing::info!("{} closed", tab_id);
        Ok(())
    }

    fn send_input(&mut self, tab_id: TabId, data: Vec<u8>) -> CoordinatorResult<()> {
        let tab = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(CoordinatorError::UnknownTab(tab_id))?;
        let channel = tab
            .channel()
            .cloned()
            .ok_or(CoordinatorError::NotConnected(tab_id))?;

        match tab.feed_input(&data) {
            InputSignal::None => {}
            signal => {
                tracing::info!("{} typed {:?} on channel {}", tab_id, signal, channel);
                self.intents
                    .insert_until(channel.clone(), Instant::now() + TYPED_EXIT_GRACE);
            }
        }

        let transport = self.transport.clone();
        let writer = self
            .writers
            .entry(channel.clone())
            .or_insert_with(|| spawn_writer(transport, channel.clone()));
        if writer.send(data).is_err() {
            tracing::warn!("writer for channel {} is gone", channel);
            self.writers.remove(&channel);
        }
        Ok(())
    }

    fn resize(&mut self, tab_id: TabId, size: TerminalSize) -> CoordinatorResult<()> {
        let tab = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(CoordinatorError::UnknownTab(tab_id))?;
        tab.set_size(size);
        let channel = tab.channel().cloned();
        self.scheduler.update_size(tab_id, size);

        if let Some(channel) = channel {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                if let Err(err) = transport.resize(&channel, size).await {
                    tracing::warn!("resize of channel {} failed: {:#}", channel, err);
                }
            });
        }
        Ok(())
    }

    fn mark_intentional_exit(
        &mut self,
        tab_id: TabId,
        channel: Option<ChannelId>,
    ) -> Option<ChannelId> {
        let channel = channel.or_else(|| {
            self.tabs
                .get(&tab_id)
                .and_then(|tab| tab.channel().cloned())
        })?;
        tracing::info!("{} marked channel {} as an intentional exit", tab_id, channel);
        self.intents.insert(channel.clone());
        Some(channel)
    }

    /// Forgets a channel and asks the transport to close it. Its `closed`
    /// event, if one still arrives, is consumed as intentional.
    fn retire_channel(&mut self, channel: ChannelId) {
        self.intents.insert(channel.clone());
        self.dispatcher.unsubscribe(&channel);
        self.browsers.remove(&channel);
        self.writers.remove(&channel);
        self.registry.unregister(&channel);
        self.request_disconnect(channel);
    }

    fn request_disconnect(&self, channel: ChannelId) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(err) = transport.disconnect(&channel).await {
                tracing::warn!("disconnect of channel {} failed: {:#}", channel, err);
            }
        });
    }

    fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.dispatcher.clear();
        let channels: Vec<ChannelId> = self
            .tabs
            .values_mut()
            .filter_map(TabState::disconnect)
            .collect();
        for channel in channels {
            self.retire_channel(channel);
        }
        self.tabs.clear();
        self.browsers.clear();
        self.writers.clear();
        self.early_closes.clear();
        self.buffers.lock().clear();
        tracing::info!("session coordinator shutting down");
    }
}

/// Serializes writes to one channel so keystrokes reach the host in order.
fn spawn_writer(
    transport: Arc<dyn Transport>,
    channel: ChannelId,
) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            match tokio::time::timeout(WRITE_TIMEOUT, transport.send(&channel, &data)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("write to channel {} failed: {:#}", channel, err),
                Err(_) => {
                    tracing::warn!("write to channel {} timed out - session unresponsive", channel)
                }
            }
        }
        tracing::debug!("writer for channel {} finished", channel);
    });
    tx
}
