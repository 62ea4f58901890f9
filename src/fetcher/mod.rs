pub mod favicon;
pub mod feed_fetcher;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::{FeedmillError, Result};
use crate::domain::{Item, Validators};

#[derive(Debug)]
pub enum FetchOutcome {
    /// Parsed, sanitized and enhanced content
    Fetched(FetchedFeed),
    /// Content not modified (HTTP 304)
    NotModified,
}

/// Feed metadata plus items in source order.
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub favicon_link: Option<String>,
    /// Validators to send on the next conditional request.
    pub validators: Validators,
    pub items: Vec<Item>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn can_handle(&self, url: &str) -> bool;

    async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome>;
}

/// Ordered chain of fetch strategies; the first one accepting a URL wins.
#[derive(Default, Clone)]
pub struct FetcherRegistry {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.push(fetcher);
    }

    pub fn with(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.register(fetcher);
        self
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    pub async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome> {
        let fetcher = self
            .fetchers
            .iter()
            .find(|f| f.can_handle(url))
            .ok_or_else(|| FeedmillError::UnsupportedSource(url.to_string()))?;

        fetcher.fetch(url, validators).await
    }
}
