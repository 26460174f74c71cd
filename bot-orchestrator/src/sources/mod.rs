mod rss_feed;

pub use rss_feed::RssFeedSource;

use crate::types::{Article, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for pulling articles from a news source (RSS feed, API, etc.)
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Unique identifier for this source
    fn source_id(&self) -> String;

    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch articles newer than the given watermark. `None` means no
    /// watermark is stored yet and everything available is new.
    async fn poll(&mut self, since: Option<DateTime<Utc>>) -> Result<Vec<Article>>;
}
