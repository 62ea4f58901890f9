use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;
use url::Url;

use crate::app::Result;
use crate::domain::{Item, Validators};
use crate::enhancer::Enhancer;
use crate::fetcher::favicon::FaviconResolver;
use crate::fetcher::http::{ConditionalResponse, HttpClient};
use crate::fetcher::{FetchOutcome, FetchedFeed, Fetcher};
use crate::normalizer::Normalizer;
use crate::sanitizer::Sanitizer;

/// Items enhanced concurrently within one feed.
const ITEM_CONCURRENCY: usize = 4;

/// RSS/Atom over HTTP(S).
pub struct FeedFetcher {
    http: HttpClient,
    normalizer: Normalizer,
    sanitizer: Sanitizer,
    enhancer: Arc<Enhancer>,
    favicons: Arc<FaviconResolver>,
}

impl FeedFetcher {
    pub fn new(http: HttpClient, enhancer: Arc<Enhancer>, favicons: Arc<FaviconResolver>) -> Self {
        Self {
            http,
            normalizer: Normalizer::new(),
            sanitizer: Sanitizer::new(),
            enhancer,
            favicons,
        }
    }

    /// Sanitizes, enhances and sanitizes again, keeping source order.
    async fn prepare_items(&self, feed_url: &str, items: Vec<Item>) -> Vec<Item> {
        stream::iter(items)
            .map(|item| self.prepare_item(feed_url, item))
            .buffered(ITEM_CONCURRENCY)
            .collect()
            .await
    }

    async fn prepare_item(&self, feed_url: &str, mut item: Item) -> Item {
        let raw = item.body.take().unwrap_or_default();
        let base = item.url.clone();

        let clean = self.clean(&raw, base.as_deref());
        let enhanced = self.enhancer.enhance(feed_url, base.as_deref(), clean).await;
        let body = self.clean(&enhanced, base.as_deref());

        item.body = (!body.is_empty()).then_some(body);
        item
    }

    fn clean(&self, raw: &str, base: Option<&str>) -> String {
        match base {
            Some(base) => self.sanitizer.sanitize_with_base(raw, base),
            None => self.sanitizer.sanitize(raw),
        }
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
    }

    async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome> {
        let (body, etag, last_modified) = match self.http.conditional_get(url, validators).await? {
            ConditionalResponse::NotModified => {
                debug!(feed = %url, "not modified");
                return Ok(FetchOutcome::NotModified);
            }
            ConditionalResponse::Content {
                body,
                etag,
                last_modified,
            } => (body, etag, last_modified),
        };

        let (meta, items) = self.normalizer.normalize(&body)?;
        let site = meta.link.clone().unwrap_or_else(|| url.to_string());

        let (favicon_link, items) = futures::join!(
            self.favicons.resolve(&site),
            self.prepare_items(url, items)
        );

        debug!(feed = %url, items = items.len(), "fetched");

        Ok(FetchOutcome::Fetched(FetchedFeed {
            title: meta.title,
            link: meta.link,
            favicon_link,
            validators: Validators {
                etag,
                last_modified,
            },
            items,
        }))
    }
}
