pub mod browser;

pub use browser::{FileBrowser, FileBrowsers};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub permissions: String,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub current_path: String,
    pub parent_path: Option<String>,
    pub entries: Vec<FileEntry>,
}

/// A remote filesystem change (or transfer) run under the per-channel lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    Mkdir { path: String },
    Touch { path: String },
    Delete { path: String, recursive: bool },
    Rename { from: String, to: String },
    Upload { local_path: PathBuf, remote_path: String },
    Download { remote_path: String, local_path: PathBuf },
}

impl FileOperation {
    /// Downloads leave the remote directory untouched; everything else is
    /// followed by a re-listing.
    pub fn refreshes_listing(&self) -> bool {
        !matches!(self, Self::Download { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mkdir { .. } => "Create folder",
            Self::Touch { .. } => "Create file",
            Self::Delete { .. } => "Delete",
            Self::Rename { .. } => "Rename",
            Self::Upload { .. } => "Upload",
            Self::Download { .. } => "Download",
        }
    }

    pub fn target(&self) -> String {
        match self {
            Self::Mkdir { path } | Self::Touch { path } | Self::Delete { path, .. } => path.clone(),
            Self::Rename { from, .. } => from.clone(),
            Self::Upload { remote_path, .. } | Self::Download { remote_path, .. } => {
                remote_path.clone()
            }
        }
    }

    /// What a user would have typed to do the same thing by hand.
    pub fn shell_equivalent(&self) -> String {
        match self {
            Self::Mkdir { path } => format!("mkdir -p {}", shell_quote(path)),
            Self::Touch { path } => format!("touch {}", shell_quote(path)),
            Self::Delete {
                path,
                recursive: true,
            } => format!("rm -rf {}", shell_quote(path)),
            Self::Delete {
                path,
                recursive: false,
            } => format!("rm -f {}", shell_quote(path)),
            Self::Rename { from, to } => format!("mv {} {}", shell_quote(from), shell_quote(to)),
            Self::Upload {
                local_path,
                remote_path,
            } => format!(
                "put {} {}",
                shell_quote(&local_path.to_string_lossy()),
                shell_quote(remote_path)
            ),
            Self::Download {
                remote_path,
                local_path,
            } => format!(
                "get {} {}",
                shell_quote(remote_path),
                shell_quote(&local_path.to_string_lossy())
            ),
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another operation is in flight on the channel.
    Busy,
    Debounced,
    AtRoot,
    NoHistory,
    NoListing,
    /// No tab owns the channel.
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileOpReport {
    pub transferred: Option<u64>,
    pub listing: Option<DirectoryListing>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOpOutcome {
    Completed(FileOpReport),
    Skipped(SkipReason),
    Failed(String),
}

impl FileOpOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn listing(&self) -> Option<&DirectoryListing> {
        match self {
            Self::Completed(report) => report.listing.as_ref(),
            _ => None,
        }
    }
}
