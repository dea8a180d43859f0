use tokio::sync::oneshot;

use crate::core::reconnect::RetryTicket;
use crate::core::state::TabSnapshot;
use crate::core::{ChannelId, TabId, TerminalSize};
use crate::error::CoordinatorResult;
use crate::output::OutputCallback;
use crate::session::SessionDescriptor;
use crate::sftp::{DirectoryListing, FileOpOutcome, FileOperation};

pub(crate) type Reply<T> = oneshot::Sender<T>;
pub(crate) type ConnectReply = Reply<CoordinatorResult<Option<ChannelId>>>;
pub(crate) type FileReply = Reply<FileOpOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectOrigin {
    Manual,
    ManualReconnect,
    Scheduled { attempt: u32 },
}

impl ConnectOrigin {
    pub(crate) fn is_reconnect(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListTarget {
    Path { path: String, skip_debounce: bool },
    Refresh,
    Into(String),
    Up,
    Back,
}

/// History change made when a listing was accepted, undone if it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HistoryChange {
    None,
    Pushed,
    Popped(String),
}

/// Result of a mutating operation that is waiting on its follow-up listing.
#[derive(Debug)]
pub(crate) struct AfterOperation {
    pub(crate) operation: FileOperation,
    pub(crate) transferred: Option<u64>,
}

pub(crate) enum Message {
    OpenTab {
        title: String,
        reply: Reply<TabId>,
    },
    CloseTab {
        tab_id: TabId,
        reply: Reply<CoordinatorResult<()>>,
    },
    Snapshot {
        tab_id: TabId,
        reply: Reply<Option<TabSnapshot>>,
    },
    Connect {
        tab_id: TabId,
        descriptor: SessionDescriptor,
        size: TerminalSize,
        reply: ConnectReply,
    },
    Reconnect {
        tab_id: TabId,
        reply: ConnectReply,
    },
    Disconnect {
        tab_id: TabId,
        channel: Option<ChannelId>,
        reply: Reply<CoordinatorResult<()>>,
    },
    SendInput {
        tab_id: TabId,
        data: Vec<u8>,
        reply: Reply<CoordinatorResult<()>>,
    },
    Resize {
        tab_id: TabId,
        size: TerminalSize,
        reply: Reply<CoordinatorResult<()>>,
    },
    Subscribe {
        channel: ChannelId,
        on_data: OutputCallback,
        reply: Reply<bool>,
    },
    Unsubscribe {
        channel: ChannelId,
        reply: Reply<bool>,
    },
    ArmAutoReconnect {
        tab_id: TabId,
        descriptor: SessionDescriptor,
        size: TerminalSize,
        on_output: OutputCallback,
        reply: Reply<CoordinatorResult<()>>,
    },
    DisarmAutoReconnect {
        tab_id: TabId,
        reply: Reply<bool>,
    },
    MarkIntentionalExit {
        tab_id: TabId,
        channel: Option<ChannelId>,
        reply: Reply<Option<ChannelId>>,
    },
    List {
        channel: ChannelId,
        target: ListTarget,
        reply: FileReply,
    },
    Operate {
        channel: ChannelId,
        operation: FileOperation,
        reply: FileReply,
    },
    Listing {
        channel: ChannelId,
        reply: Reply<Option<DirectoryListing>>,
    },
    Shutdown {
        reply: Reply<()>,
    },

    // Completions of work spawned by the actor.
    ConnectFinished {
        tab_id: TabId,
        generation: u64,
        origin: ConnectOrigin,
        result: Result<ChannelId, String>,
        reply: Option<ConnectReply>,
    },
    RetryFired(RetryTicket),
    ListingFinished {
        channel: ChannelId,
        path: String,
        history: HistoryChange,
        after: Option<AfterOperation>,
        result: Result<DirectoryListing, String>,
        reply: FileReply,
    },
    OperationFinished {
        channel: ChannelId,
        operation: FileOperation,
        result: Result<Option<u64>, String>,
        reply: FileReply,
    },
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenTab { .. } => "OpenTab",
            Self::CloseTab { .. } => "CloseTab",
            Self::Snapshot { .. } => "Snapshot",
            Self::Connect { .. } => "Connect",
            Self::Reconnect { .. } => "Reconnect",
            Self::Disconnect { .. } => "Disconnect",
            Self::SendInput { .. } => "SendInput",
            Self::Resize { .. } => "Resize",
            Self::Subscribe { .. } => "Subscribe",
            Self::Unsubscribe { .. } => "Unsubscribe",
            Self::ArmAutoReconnect { .. } => "ArmAutoReconnect",
            Self::DisarmAutoReconnect { .. } => "DisarmAutoReconnect",
            Self::MarkIntentionalExit { .. } => "MarkIntentionalExit",
            Self::List { .. } => "List",
            Self::Operate { .. } => "Operate",
            Self::Listing { .. } => "Listing",
            Self::Shutdown { .. } => "Shutdown",
            Self::ConnectFinished { .. } => "ConnectFinished",
            Self::RetryFired(_) => "RetryFired",
            Self::ListingFinished { .. } => "ListingFinished",
            Self::OperationFinished { .. } => "OperationFinished",
        };
        f.write_str(name)
    }
}
