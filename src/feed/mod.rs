pub mod paginator;

use async_trait::async_trait;

use crate::error::{CardError, ScrapeError};

pub use paginator::{FeedPaginator, PaginationSettings, StopReason};

/// A virtualized, lazily rendered result list.
///
/// Items are only materialized in response to `load_more`; handles are valid
/// for the current render and read once.
#[async_trait]
pub trait FeedSurface: Send + Sync {
    type Item: Send + Sync;

    /// Every item currently rendered, in render order.
    async fn materialized(&self) -> Result<Vec<Self::Item>, ScrapeError>;

    /// One "request more" gesture against the feed container.
    async fn load_more(&self) -> Result<(), ScrapeError>;

    /// Whether the end-of-list marker is on screen.
    async fn end_of_list(&self) -> Result<bool, ScrapeError>;

    async fn card_text(&self, item: &Self::Item) -> Result<String, CardError>;
}
