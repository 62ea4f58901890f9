use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FeedmillError, Result};
use crate::domain::Item;

#[derive(Debug, Clone, Default)]
pub struct FeedMeta {
    pub title: Option<String>,
    /// Website the feed describes.
    pub link: Option<String>,
}

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parses an RSS/Atom document into feed metadata and items in document
    /// order. Item bodies are left raw; sanitizing happens downstream.
    pub fn normalize(&self, body: &[u8]) -> Result<(FeedMeta, Vec<Item>)> {
        // Entries without an id keep it empty so the fingerprint falls back to
        // title, link and date instead of a random UUID.
        let feed = parser::Builder::new()
            .id_generator(|_, _, _| String::new())
            .build()
            .parse(body)
            .map_err(|e| FeedmillError::FeedFormat(e.to_string()))?;

        let meta = FeedMeta {
            title: feed.title.map(|t| decode_html_entities(&t.content).trim().to_string()),
            link: site_link(&feed.links),
        };

        let items = feed.entries.into_iter().map(Self::item_from_entry).collect();

        Ok((meta, items))
    }

    fn item_from_entry(entry: Entry) -> Item {
        let title = entry
            .title
            .map(|t| decode_html_entities(&t.content).trim().to_string());
        let link = site_link(&entry.links);
        let published = entry.published.or(entry.updated);

        let mut item = if entry.id.trim().is_empty() {
            Item::without_guid(title.as_deref(), link.as_deref(), published)
        } else {
            Item::new(entry.id.trim())
        };

        item.title = title;
        item.url = link;
        item.author = entry
            .authors
            .first()
            .map(|a| decode_html_entities(&a.name).to_string());
        item.body = entry
            .content
            .and_then(|c| c.body)
            .or(entry.summary.map(|s| s.content));
        item.pub_date = published;

        if let Some(media) = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .find(|c| c.url.is_some())
        {
            item.enclosure_link = media.url.as_ref().map(|u| u.to_string());
            item.enclosure_mime = media.content_type.as_ref().map(|m| m.to_string());
        }

        item
    }
}

/// Picks the alternate link, skipping `self`/`hub` style links.
fn site_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}
