use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{DirectoryListing, SkipReason};
use crate::core::ChannelId;

/// Remote file browser state for one channel.
///
/// `operating` is the single-flight flag: while it is set, new operations on
/// the channel are dropped rather than queued.
#[derive(Debug, Default)]
pub struct FileBrowser {
    operating: bool,
    last_list_at: Option<Instant>,
    listing: Option<DirectoryListing>,
    history: Vec<String>,
}

impl FileBrowser {
    pub fn is_operating(&self) -> bool {
        self.operating
    }

    /// Claims the channel for a listing. Debounced calls are measured from the
    /// previous accepted debounced call; `skip_debounce` is for manual refresh.
    pub fn try_begin_list(
        &mut self,
        now: Instant,
        debounce: Duration,
        skip_debounce: bool,
    ) -> Result<(), SkipReason> {
        if self.operating {
            return Err(SkipReason::Busy);
        }
        if !skip_debounce {
            if let Some(last) = self.last_list_at {
                if now.saturating_duration_since(last) < debounce {
                    return Err(SkipReason::Debounced);
                }
            }
            self.last_list_at = Some(now);
        }
        self.operating = true;
        Ok(())
    }

    pub fn try_begin(&mut self) -> Result<(), SkipReason> {
        if self.operating {
            return Err(SkipReason::Busy);
        }
        self.operating = true;
        Ok(())
    }

    pub fn finish(&mut self) {
        self.operating = false;
    }

    pub fn apply_listing(&mut self, listing: DirectoryListing) {
        self.listing = Some(listing);
    }

    pub fn listing(&self) -> Option<&DirectoryListing> {
        self.listing.as_ref()
    }

    pub fn current_path(&self) -> Option<&str> {
        self.listing
            .as_ref()
            .map(|listing| listing.current_path.as_str())
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.listing
            .as_ref()
            .and_then(|listing| listing.parent_path.as_deref())
    }

    pub fn push_history(&mut self, path: String) {
        self.history.push(path);
    }

    pub fn pop_history(&mut self) -> Option<String> {
        self.history.pop()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

#[derive(Debug, Default)]
pub struct FileBrowsers {
    browsers: HashMap<ChannelId, FileBrowser>,
}

impl FileBrowsers {
    pub fn entry(&mut self, channel_id: &ChannelId) -> &mut FileBrowser {
        self.browsers.entry(channel_id.clone()).or_default()
    }

    pub fn get(&self, channel_id: &ChannelId) -> Option<&FileBrowser> {
        self.browsers.get(channel_id)
    }

    pub fn get_mut(&mut self, channel_id: &ChannelId) -> Option<&mut FileBrowser> {
        self.browsers.get_mut(channel_id)
    }

    pub fn remove(&mut self, channel_id: &ChannelId) -> Option<FileBrowser> {
        self.browsers.remove(channel_id)
    }

    pub fn clear(&mut self) {
        self.browsers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn second_list_inside_window_is_debounced() {
        let mut browser = FileBrowser::default();
        let start = Instant::now();
        assert_eq!(browser.try_begin_list(start, DEBOUNCE, false), Ok(()));
        browser.finish();

        let soon = start + Duration::from_millis(50);
        assert_eq!(
            browser.try_begin_list(soon, DEBOUNCE, false),
            Err(SkipReason::Debounced)
        );

        let later = start + Duration::from_millis(350);
        assert_eq!(browser.try_begin_list(later, DEBOUNCE, false), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_ignores_debounce_but_not_busy() {
        let mut browser = FileBrowser::default();
        let now = Instant::now();
        assert_eq!(browser.try_begin_list(now, DEBOUNCE, false), Ok(()));
        assert_eq!(
            browser.try_begin_list(now, DEBOUNCE, true),
            Err(SkipReason::Busy)
        );
        browser.finish();
        assert_eq!(browser.try_begin_list(now, DEBOUNCE, true), Ok(()));
    }

    #[test]
    fn single_flight_guard() {
        let mut browser = FileBrowser::default();
        assert_eq!(browser.try_begin(), Ok(()));
        assert!(browser.is_operating());
        assert_eq!(browser.try_begin(), Err(SkipReason::Busy));
        browser.finish();
        assert_eq!(browser.try_begin(), Ok(()));
    }

    #[test]
    fn history_is_a_stack() {
        let mut browser = FileBrowser::default();
        browser.push_history("/".to_string());
        browser.push_history("/srv".to_string());
        assert_eq!(browser.pop_history().as_deref(), Some("/srv"));
        assert_eq!(browser.history(), ["/".to_string()]);
    }
}
