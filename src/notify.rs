use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Implemented by the UI to surface toasts. The coordinator only calls it.
pub trait NotificationSink: Send + Sync {
    fn on_error(&self, title: &str, message: &str);

    fn on_info(&self, title: &str, message: &str);

    /// Shell-equivalent of a completed file operation, for an activity log.
    fn on_command(&self, _command: &str) {}
}

/// Sink that only logs, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn on_error(&self, title: &str, message: &str) {
        tracing::error!("{}: {}", title, message);
    }

    fn on_info(&self, title: &str, message: &str) {
        tracing::info!("{}: {}", title, message);
    }

    fn on_command(&self, command: &str) {
        tracing::info!("$ {}", command);
    }
}

/// Wraps a sink and suppresses identical notifications repeated within `window`.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    window: Duration,
    recent: HashMap<(String, String), Instant>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("window", &self.window)
            .field("recent", &self.recent.len())
            .finish()
    }
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, window: Duration) -> Self {
        Self {
            sink,
            window,
            recent: HashMap::new(),
        }
    }

    /// Returns `false` if the notification was suppressed as a duplicate.
    pub fn error(&mut self, title: &str, message: &str) -> bool {
        if !self.admit(title, message) {
            return false;
        }
        self.sink.on_error(title, message);
        true
    }

    pub fn info(&mut self, title: &str, message: &str) -> bool {
        if !self.admit(title, message) {
            return false;
        }
        self.sink.on_info(title, message);
        true
    }

    pub fn command(&self, command: &str) {
        self.sink.on_command(command);
    }

    fn admit(&mut self, title: &str, message: &str) -> bool {
        let now = Instant::now();
        let window = self.window;
        self.recent
            .retain(|_, shown_at| now.duration_since(*shown_at) < window);

        let key = (title.to_string(), message.to_string());
        if self.recent.contains_key(&key) {
            tracing::debug!("suppressing duplicate notification: {}", title);
            return false;
        }
        self.recent.insert(key, now);
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Note {
        Error(String, String),
        Info(String, String),
        Command(String),
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) notes: Mutex<Vec<Note>>,
    }

    impl RecordingSink {
        pub(crate) fn errors(&self) -> Vec<(String, String)> {
            self.notes
                .lock()
                .iter()
                .filter_map(|note| match note {
                    Note::Error(title, message) => Some((title.clone(), message.clone())),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn infos(&self) -> Vec<(String, String)> {
            self.notes
                .lock()
                .iter()
                .filter_map(|note| match note {
                    Note::Info(title, message) => Some((title.clone(), message.clone())),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn commands(&self) -> Vec<String> {
            self.notes
                .lock()
                .iter()
                .filter_map(|note| match note {
                    Note::Command(command) => Some(command.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn on_error(&self, title: &str, message: &str) {
            self.notes
                .lock()
                .push(Note::Error(title.to_string(), message.to_string()));
        }

        fn on_info(&self, title: &str, message: &str) {
            self.notes
                .lock()
                .push(Note::Info(title.to_string(), message.to_string()));
        }

        fn on_command(&self, command: &str) {
            self.notes.lock().push(Note::Command(command.to_string()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_inside_window_are_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let mut notifier = Notifier::new(sink.clone(), Duration::from_secs(2));

        assert!(notifier.error("Connection refused", "web01"));
        assert!(!notifier.error("Connection refused", "web01"));
        assert!(notifier.error("Connection refused", "web02"));

        tokio::time::advance(Duration::from_millis(2_100)).await;
        assert!(notifier.error("Connection refused", "web01"));

        assert_eq!(sink.errors().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_never_deduplicated() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(sink.clone(), Duration::from_secs(2));
        notifier.command("mkdir -p '/tmp/a'");
        notifier.command("mkdir -p '/tmp/a'");
        assert_eq!(sink.commands().len(), 2);
    }
}
