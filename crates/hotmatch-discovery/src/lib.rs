//! Startup discovery from news feeds: RSS/Atom parsing, article cleanup,
//! the extraction prompt, mapping model output to `DiscoveredStartup` rows,
//! name de-duplication and funding amount parsing.

pub mod article;
pub mod dedupe;
pub mod extract;
pub mod feed;
pub mod funding;

use async_trait::async_trait;
use hotmatch_core::RssSource;
use hotmatch_fetch::{FetchError, HttpFetcher};
use thiserror::Error;
use uuid::Uuid;

pub use article::{clean_html, truncate_chars, Article, ARTICLE_CONTENT_CHARS};
pub use dedupe::{NameIndex, NAME_SIMILARITY_THRESHOLD};
pub use extract::{discovery_request, parse_discovery_response, DISCOVERY_MAX_TOKENS};
pub use feed::{parse_feed, recent_items, FeedItem, MAX_ITEMS_PER_SOURCE, RECENT_DAYS};
pub use funding::parse_funding_amount;

pub const CRATE_NAME: &str = "hotmatch-discovery";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("feed xml error: {0}")]
    Feed(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Where feed documents come from. `HttpFetcher` in production, canned XML in tests.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, run_id: Uuid, source: &RssSource) -> Result<String, DiscoveryError>;
}

#[async_trait]
impl FeedSource for HttpFetcher {
    async fn fetch_feed(&self, run_id: Uuid, source: &RssSource) -> Result<String, DiscoveryError> {
        Ok(self.get_text(run_id, &source.url).await?)
    }
}
