//! URL-keyed article body rewriting.
//!
//! Strategies are registered under a match key such as `explosm.net` or
//! `penny-arcade.com/news`. For each item every strategy whose key matches the
//! feed or article URL runs in registration order, each one consuming the
//! previous output. A failing strategy is logged and skipped.

pub mod pattern;
pub mod selector;
pub mod tables;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use pattern::PatternEnhancer;
pub use selector::SelectorEnhancer;
pub use tables::EnhancerTables;

#[derive(Debug, thiserror::Error)]
pub enum EnhanceError {
    #[error("Article page fetch failed: {0}")]
    Fetch(String),

    #[error("Nothing matched {0}")]
    NoMatch(String),

    #[error("Invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Invalid pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

#[async_trait]
pub trait ArticleEnhancer: Send + Sync {
    /// Returns the rewritten body, or `body` unchanged when `article_url` is
    /// not one this strategy cares about.
    async fn enhance(&self, article_url: &str, body: &str) -> Result<String, EnhanceError>;
}

/// Normalized prefix a URL must start with for a strategy to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn new(key: &str) -> Self {
        Self(strip_url(key))
    }

    pub fn matches(&self, url: &str) -> bool {
        !self.0.is_empty() && strip_url(url).starts_with(&self.0)
    }
}

/// Lowercases and drops the scheme and a leading `www.`.
fn strip_url(url: &str) -> String {
    let url = url.trim().to_lowercase();
    let rest = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest);
    rest.strip_prefix("www.").unwrap_or(rest).to_string()
}

#[derive(Default, Clone)]
pub struct Enhancer {
    registrations: Vec<(MatchKey, Arc<dyn ArticleEnhancer>)>,
}

impl Enhancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &str, strategy: Arc<dyn ArticleEnhancer>) {
        self.registrations.push((MatchKey::new(key), strategy));
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub async fn enhance(&self, feed_url: &str, article_url: Option<&str>, body: String) -> String {
        let Some(article_url) = article_url else {
            return body;
        };

        let mut body = body;
        for (key, strategy) in &self.registrations {
            if !key.matches(feed_url) && !key.matches(article_url) {
                continue;
            }

            match strategy.enhance(article_url, &body).await {
                Ok(enhanced) => body = enhanced,
                Err(e) => warn!(
                    feed = %feed_url,
                    article = %article_url,
                    error = %e,
                    "enhancement skipped"
                ),
            }
        }

        body
    }
}
