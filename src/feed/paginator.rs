use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use super::FeedSurface;
use crate::error::ScrapeError;

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationSettings {
    /// Wait after each scroll before re-reading the feed.
    pub settle_ms: u64,
    /// Vertical wheel distance per scroll.
    pub scroll_px: i64,
    pub max_rounds: usize,
    /// Consecutive rounds without growth before giving up.
    pub stall_rounds: usize,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        PaginationSettings {
            settle_ms: 2000,
            scroll_px: 5000,
            max_rounds: 50,
            stall_rounds: 3,
        }
    }
}

impl PaginationSettings {
    fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyTarget,
    TargetReached,
    EndOfList,
    Stalled,
    RoundLimit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::EmptyTarget => "empty_target",
            StopReason::TargetReached => "target_reached",
            StopReason::EndOfList => "end_of_list",
            StopReason::Stalled => "stalled",
            StopReason::RoundLimit => "round_limit",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Pagination<T> {
    pub items: Vec<T>,
    pub rounds: usize,
    pub stop: StopReason,
}

/// Grows a lazily rendered feed until enough items exist or it runs dry.
///
/// Every round acts, waits, then observes: the feed only grows after a scroll,
/// so reading first would race the renderer.
pub struct FeedPaginator<'a, S> {
    surface: &'a S,
    settings: PaginationSettings,
}

impl<'a, S: FeedSurface> FeedPaginator<'a, S> {
    pub fn new(surface: &'a S, settings: PaginationSettings) -> Self {
        FeedPaginator { surface, settings }
    }

    pub async fn collect(&self, target: usize) -> Result<Pagination<S::Item>, ScrapeError> {
        if target == 0 {
            return Ok(Pagination {
                items: Vec::new(),
                rounds: 0,
                stop: StopReason::EmptyTarget,
            });
        }

        let mut items = self.surface.materialized().await?;
        let mut rounds = 0;
        let mut idle_rounds = 0;

        let stop = loop {
            if items.len() >= target {
                break StopReason::TargetReached;
            }
            if rounds > 0 {
                if self.surface.end_of_list().await? {
                    break StopReason::EndOfList;
                }
                if idle_rounds >= self.settings.stall_rounds {
                    break StopReason::Stalled;
                }
            }
            if rounds >= self.settings.max_rounds {
                break StopReason::RoundLimit;
            }

            self.surface.load_more().await?;
            tokio::time::sleep(self.settings.settle()).await;
            rounds += 1;

            let before = items.len();
            items = self.surface.materialized().await?;
            info!("Loaded {} items (round {})", items.len(), rounds);

            if items.len() > before {
                idle_rounds = 0;
            } else {
                idle_rounds += 1;
                debug!("Feed did not grow ({} idle rounds)", idle_rounds);
            }
        };

        items.truncate(target);
        info!("Pagination stopped: {} ({} items, {} rounds)", stop, items.len(), rounds);

        Ok(Pagination { items, rounds, stop })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::feed::testing::{MissingFeed, ScriptedFeed};

    fn settings() -> PaginationSettings {
        PaginationSettings {
            settle_ms: 0,
            ..PaginationSettings::default()
        }
    }

    #[tokio::test]
    async fn zero_target_does_not_touch_feed() {
        let feed = ScriptedFeed::new(7, &[7, 7]);
        let page = FeedPaginator::new(&feed, settings()).collect(0).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.stop, StopReason::EmptyTarget);
        assert_eq!(feed.scrolls(), 0);
    }

    #[tokio::test]
    async fn initial_render_already_enough() {
        let feed = ScriptedFeed::new(12, &[]);
        let page = FeedPaginator::new(&feed, settings()).collect(10).await.unwrap();
        assert_eq!(page.items, (1..=10).collect::<Vec<u32>>());
        assert_eq!(page.stop, StopReason::TargetReached);
        assert_eq!(feed.scrolls(), 0);
    }

    #[tokio::test]
    async fn scrolls_until_target_and_truncates() {
        let feed = ScriptedFeed::new(7, &[7, 7, 7]);
        let page = FeedPaginator::new(&feed, settings()).collect(20).await.unwrap();
        assert_eq!(page.items.len(), 20);
        assert_eq!(page.stop, StopReason::TargetReached);
        assert_eq!(page.rounds, 2);
        assert_eq!(feed.scrolls(), 2);

        let unique: HashSet<_> = page.items.iter().collect();
        assert_eq!(unique.len(), page.items.len());
        assert!(page.items.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn end_marker_returns_partial_list() {
        let feed = ScriptedFeed::new(5, &[4, 3]).with_end_marker_after(2);
        let page = FeedPaginator::new(&feed, settings()).collect(50).await.unwrap();
        assert_eq!(page.items.len(), 12);
        assert_eq!(page.stop, StopReason::EndOfList);
        assert_eq!(feed.scrolls(), 2);
    }

    #[tokio::test]
    async fn target_wins_over_end_marker() {
        let feed = ScriptedFeed::new(5, &[5]).with_end_marker_after(1);
        let page = FeedPaginator::new(&feed, settings()).collect(10).await.unwrap();
        assert_eq!(page.stop, StopReason::TargetReached);
    }

    #[tokio::test]
    async fn stalled_feed_stops() {
        let feed = ScriptedFeed::new(4, &[2]);
        let page = FeedPaginator::new(&feed, settings()).collect(10).await.unwrap();
        assert_eq!(page.items.len(), 6);
        assert_eq!(page.stop, StopReason::Stalled);
        // one productive scroll, then `stall_rounds` idle ones
        assert_eq!(feed.scrolls(), 1 + settings().stall_rounds);
    }

    #[tokio::test]
    async fn round_limit_caps_slow_feed() {
        let feed = ScriptedFeed::new(0, &[1; 100]);
        let cfg = PaginationSettings {
            max_rounds: 5,
            ..settings()
        };
        let page = FeedPaginator::new(&feed, cfg).collect(50).await.unwrap();
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.stop, StopReason::RoundLimit);
        assert_eq!(feed.scrolls(), 5);
    }

    #[tokio::test]
    async fn missing_feed_propagates() {
        let err = FeedPaginator::new(&MissingFeed, settings())
            .collect(10)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::FeedNotFound { .. }));
    }
}
