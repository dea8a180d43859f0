use tokio::time::Instant;

use super::actor::Actor;
use super::message::{AfterOperation, FileReply, HistoryChange, ListTarget, Message};
use crate::core::ChannelId;
use crate::sftp::{
    DirectoryListing, FileBrowser, FileOpOutcome, FileOpReport, FileOperation, SkipReason,
};
use crate::transport::Transport;

enum HistoryPlan {
    Keep,
    Push(String),
    Pop,
}

struct ListingPlan {
    path: String,
    skip_debounce: bool,
    history: HistoryPlan,
}

fn plan_listing(browser: &FileBrowser, target: ListTarget) -> Result<ListingPlan, SkipReason> {
    let plan = match target {
        ListTarget::Path {
            path,
            skip_debounce,
        } => ListingPlan {
            path,
            skip_debounce,
            history: HistoryPlan::Keep,
        },
        ListTarget::Refresh => ListingPlan {
            path: browser
                .current_path()
                .ok_or(SkipReason::NoListing)?
                .to_string(),
            skip_debounce: true,
            history: HistoryPlan::Keep,
        },
        ListTarget::Into(path) => ListingPlan {
            history: match browser.current_path() {
                Some(current) => HistoryPlan::Push(current.to_string()),
                None => HistoryPlan::Keep,
            },
            path,
            skip_debounce: false,
        },
        ListTarget::Up => {
            if browser.listing().is_none() {
                return Err(SkipReason::NoListing);
            }
            let parent = browser.parent_path().ok_or(SkipReason::AtRoot)?;
            ListingPlan {
                path: parent.to_string(),
                skip_debounce: false,
                history: match browser.current_path() {
                    Some(current) => HistoryPlan::Push(current.to_string()),
                    None => HistoryPlan::Keep,
                },
            }
        }
        ListTarget::Back => ListingPlan {
            path: browser
                .history()
                .last()
                .ok_or(SkipReason::NoHistory)?
                .clone(),
            skip_debounce: false,
            history: HistoryPlan::Pop,
        },
    };
    Ok(plan)
}

impl Actor {
    pub(super) fn list(&mut self, channel: ChannelId, target: ListTarget, reply: FileReply) {
        if self.registry.tab_for(&channel).is_none() {
            tracing::debug!("listing on unknown channel {} skipped", channel);
            let _ = reply.send(FileOpOutcome::Skipped(SkipReason::NotConnected));
            return;
        }
        let debounce = self.list_debounce;
        let browser = self.browsers.entry(&channel);

        let plan = match plan_listing(browser, target) {
            Ok(plan) => plan,
            Err(reason) => {
                tracing::debug!("listing on {} skipped: {:?}", channel, reason);
                let _ = reply.send(FileOpOutcome::Skipped(reason));
                return;
            }
        };
        if let Err(reason) = browser.try_begin_list(Instant::now(), debounce, plan.skip_debounce) {
            tracing::debug!("listing of {} on {} skipped: {:?}", plan.path, channel, reason);
            let _ = reply.send(FileOpOutcome::Skipped(reason));
            return;
        }

        let history = match plan.history {
            HistoryPlan::Keep => HistoryChange::None,
            HistoryPlan::Push(previous) => {
                browser.push_history(previous);
                HistoryChange::Pushed
            }
            HistoryPlan::Pop => match browser.pop_history() {
                Some(previous) => HistoryChange::Popped(previous),
                None => HistoryChange::None,
            },
        };
        self.start_listing(channel, plan.path, history, None, reply);
    }

    fn start_listing(
        &self,
        channel: ChannelId,
        path: String,
        history: HistoryChange,
        after: Option<AfterOperation>,
        reply: FileReply,
    ) {
        tracing::debug!("listing {} on channel {}", path, channel);
        let transport = self.transport.clone();
        self.perform(async move {
            let result = transport
                .list_dir(&channel, &path)
                .await
                .map_err(|err| format!("{err:#}"));
            Message::ListingFinished {
                channel,
                path,
                history,
                after,
                result,
                reply,
            }
        });
    }

    pub(super) fn listing_finished(
        &mut self,
        channel: ChannelId,
        path: String,
        history: HistoryChange,
        after: Option<AfterOperation>,
        result: Result<DirectoryListing, String>,
        reply: FileReply,
    ) {
        if let Some(after) = &after {
            tracing::debug!(
                "listing of {} after {} finished on {}",
                path,
                after.operation.label(),
                channel
            );
        }

        // The browser is gone if the channel closed while the listing ran.
        if let Some(browser) = self.browsers.get_mut(&channel) {
            browser.finish();
            match &result {
                Ok(listing) => browser.apply_listing(listing.clone()),
                Err(_) => match history {
                    HistoryChange::None => {}
                    HistoryChange::Pushed => {
                        browser.pop_history();
                    }
                    HistoryChange::Popped(previous) => browser.push_history(previous),
                },
            }
        }

        let transferred = after.as_ref().and_then(|after| after.transferred);
        let outcome = match result {
            Ok(listing) => FileOpOutcome::Completed(FileOpReport {
                transferred,
                listing: Some(listing),
            }),
            Err(message) => {
                tracing::warn!("listing {} on {} failed: {}", path, channel, message);
                self.notifier
                    .error("Failed to list directory", &format!("{path}: {message}"));
                match after {
                    Some(_) => FileOpOutcome::Completed(FileOpReport {
                        transferred,
                        listing: None,
                    }),
                    None => FileOpOutcome::Failed(message),
                }
            }
        };
        let _ = reply.send(outcome);
    }

    pub(super) fn operate(
        &mut self,
        channel: ChannelId,
        operation: FileOperation,
        reply: FileReply,
    ) {
        if self.registry.tab_for(&channel).is_none() {
            tracing::debug!("{} on unknown channel {} skipped", operation.label(), channel);
            let _ = reply.send(FileOpOutcome::Skipped(SkipReason::NotConnected));
            return;
        }
        if let Err(reason) = self.browsers.entry(&channel).try_begin() {
            tracing::debug!(
                "{} on {} skipped: {:?}",
                operation.label(),
                channel,
                reason
            );
            let _ = reply.send(FileOpOutcome::Skipped(reason));
            return;
        }

        tracing::info!("{} {} on channel {}", operation.label(), operation.target(), channel);
        let transport = self.transport.clone();
        self.perform(async move {
            let result = run_operation(transport.as_ref(), &channel, &operation)
                .await
                .map_err(|err| format!("{err:#}"));
            Message::OperationFinished {
                channel,
                operation,
                result,
                reply,
            }
        });
    }

    pub(super) fn operation_finished(
        &mut self,
        channel: ChannelId,
        operation: FileOperation,
        result: Result<Option<u64>, String>,
        reply: FileReply,
    ) {
        if let Some(browser) = self.browsers.get_mut(&channel) {
            browser.finish();
        }

        let transferred = match result {
            Ok(transferred) => transferred,
            Err(message) => {
                tracing::warn!(
                    "{} {} on {} failed: {}",
                    operation.label(),
                    operation.target(),
                    channel,
                    message
                );
                self.notifier.error(
                    &format!("{} failed", operation.label()),
                    &format!("{}: {}", operation.target(), message),
                );
                let _ = reply.send(FileOpOutcome::Failed(message));
                return;
            }
        };

        self.notifier.command(&operation.shell_equivalent());

        let debounce = self.list_debounce;
        let relist = if operation.refreshes_listing() {
            self.browsers.get_mut(&channel).and_then(|browser| {
                let path = browser.current_path()?.to_string();
                browser
                    .try_begin_list(Instant::now(), debounce, true)
                    .ok()
                    .map(|()| path)
            })
        } else {
            None
        };

        match relist {
            Some(path) => self.start_listing(
                channel,
                path,
                HistoryChange::None,
                Some(AfterOperation {
                    operation,
                    transferred,
                }),
                reply,
            ),
            None => {
                let _ = reply.send(FileOpOutcome::Completed(FileOpReport {
                    transferred,
                    listing: None,
                }));
            }
        }
    }
}

async fn run_operation(
    transport: &dyn Transport,
    channel: &ChannelId,
    operation: &FileOperation,
) -> anyhow::Result<Option<u64>> {
    match operation {
        FileOperation::Mkdir { path } => transport.mkdir(channel, path).await.map(|()| None),
        FileOperation::Touch { path } => transport.touch(channel, path).await.map(|()| None),
        FileOperation::Delete { path, recursive } => transport
            .delete(channel, path, *recursive)
            .await
            .map(|()| None),
        FileOperation::Rename { from, to } => {
            transport.rename(channel, from, to).await.map(|()| None)
        }
        FileOperation::Upload {
            local_path,
            remote_path,
        } => transport
            .upload(channel, local_path, remote_path)
            .await
            .map(Some),
        FileOperation::Download {
            remote_path,
            local_path,
        } => transport
            .download(channel, remote_path, local_path)
            .await
            .map(Some),
    }
}
