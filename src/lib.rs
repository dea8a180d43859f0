//! Connection and I/O coordination for many concurrent remote shell sessions:
//! channel ownership, reconnect with backoff, output fan-out and buffering,
//! and single-flight remote file operations.

pub mod coordinator;
pub mod core;
pub mod error;
pub mod notify;
pub mod output;
pub mod session;
pub mod settings;
pub mod sftp;
pub mod telemetry;
pub mod terminal;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use coordinator::Coordinator;
pub use crate::core::state::{ConnectionStatus, TabSnapshot};
pub use crate::core::{ChannelId, TabId, TerminalSize};
pub use error::{ConnectErrorKind, CoordinatorError, CoordinatorResult};
pub use notify::{NotificationSink, TracingSink};
pub use output::OutputCallback;
pub use session::{AuthMethod, JumpHost, SessionDescriptor};
pub use settings::{CoordinatorSettings, SettingsStorage};
pub use sftp::{DirectoryListing, FileEntry, FileOpOutcome, FileOpReport, FileOperation, SkipReason};
pub use transport::{Transport, TransportEvent, TransportEventReceiver, TransportEventSender};
