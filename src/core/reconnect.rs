use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{TabId, TerminalSize};
use crate::output::OutputCallback;
use crate::session::SessionDescriptor;
use crate::settings::ReconnectSettings;

/// Exponential backoff: `min(base * 2^(attempt - 1), max)` for attempts
/// `1..=max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }

    /// `None` once `attempt` is past the last allowed attempt.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// What is needed to bring a tab back after an unexpected close.
#[derive(Clone)]
pub struct ReconnectConfig {
    pub descriptor: SessionDescriptor,
    pub size: TerminalSize,
    pub on_output: OutputCallback,
}

impl fmt::Debug for ReconnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectConfig")
            .field("target", &self.descriptor.connection_string())
            .field("size", &self.size)
            .field("on_output", &"<callback>")
            .finish()
    }
}

/// Identifies one scheduled retry. A ticket is only honoured if it is still
/// the tab's outstanding retry when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTicket {
    pub tab_id: TabId,
    pub attempt: u32,
    token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrySchedule {
    Scheduled { attempt: u32, delay: Duration },
    /// Retry budget used up; the tab has been disarmed.
    Exhausted { attempts: u32 },
    NotArmed,
}

#[derive(Debug)]
struct PendingRetry {
    token: u64,
    handle: JoinHandle<()>,
}

/// Per-tab auto-reconnect configs plus at most one outstanding timer per tab.
#[derive(Debug)]
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    configs: HashMap<TabId, ReconnectConfig>,
    pending: HashMap<TabId, PendingRetry>,
    next_token: u64,
}

impl ReconnectScheduler {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            configs: HashMap::new(),
            pending: HashMap::new(),
            next_token: 1,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn arm(&mut self, tab_id: TabId, config: ReconnectConfig) {
        self.cancel_pending(tab_id);
        tracing::debug!("auto-reconnect armed for {} ({:?})", tab_id, config);
        self.configs.insert(tab_id, config);
    }

    /// Removes the config and cancels any pending timer.
    pub fn disarm(&mut self, tab_id: TabId) -> bool {
        self.cancel_pending(tab_id);
        let removed = self.configs.remove(&tab_id).is_some();
        if removed {
            tracing::debug!("auto-reconnect disarmed for {}", tab_id);
        }
        removed
    }

    pub fn is_armed(&self, tab_id: TabId) -> bool {
        self.configs.contains_key(&tab_id)
    }

    pub fn config(&self, tab_id: TabId) -> Option<&ReconnectConfig> {
        self.configs.get(&tab_id)
    }

    pub fn update_size(&mut self, tab_id: TabId, size: TerminalSize) {
        if let Some(config) = self.configs.get_mut(&tab_id) {
            config.size = size;
        }
    }

    pub fn is_pending(&self, tab_id: TabId) -> bool {
        self.pending.contains_key(&tab_id)
    }

    pub fn cancel_pending(&mut self, tab_id: TabId) -> bool {
        match self.pending.remove(&tab_id) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Starts the timer for `attempt`; `on_fire` runs when it elapses.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, tab_id: TabId, attempt: u32, on_fire: F) -> RetrySchedule
    where
        F: FnOnce(RetryTicket) + Send + 'static,
    {
        if !self.is_armed(tab_id) {
            return RetrySchedule::NotArmed;
        }

        let Some(delay) = self.policy.delay_for(attempt) else {
            self.disarm(tab_id);
            return RetrySchedule::Exhausted {
                attempts: self.policy.max_attempts,
            };
        };

        self.cancel_pending(tab_id);
        let token = self.next_token;
        self.next_token += 1;

        let ticket = RetryTicket {
            tab_id,
            attempt,
            token,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(ticket);
        });
        self.pending.insert(tab_id, PendingRetry { token, handle });

        RetrySchedule::Scheduled { attempt, delay }
    }

    /// Claims a fired ticket. Returns the config to reconnect with, or `None`
    /// if the retry was cancelled, superseded or the tab was disarmed.
    pub fn take_fired(&mut self, ticket: &RetryTicket) -> Option<ReconnectConfig> {
        match self.pending.get(&ticket.tab_id) {
            Some(pending) if pending.token == ticket.token => {
                self.pending.remove(&ticket.tab_id);
            }
            _ => return None,
        }
        self.configs.get(&ticket.tab_id).cloned()
    }

    pub fn shutdown(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
        self.configs.clear();
    }
}
