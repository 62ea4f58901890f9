use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use crate::enhancer::pattern::compile;
use crate::enhancer::{ArticleEnhancer, EnhanceError};
use crate::fetcher::http::PageSource;
use crate::sanitizer::Sanitizer;

/// Replaces the body of matching articles with content extracted from the
/// full article page.
pub struct SelectorEnhancer {
    article: Regex,
    selectors: Vec<(String, Selector)>,
    pages: Arc<dyn PageSource>,
    sanitizer: Sanitizer,
}

impl SelectorEnhancer {
    pub fn new(
        article: &str,
        selectors: &[String],
        pages: Arc<dyn PageSource>,
    ) -> Result<Self, EnhanceError> {
        let selectors = selectors
            .iter()
            .map(|s| {
                Selector::parse(s)
                    .map(|parsed| (s.clone(), parsed))
                    .map_err(|e| EnhanceError::Selector {
                        selector: s.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            article: compile(article)?,
            selectors,
            pages,
            sanitizer: Sanitizer::new(),
        })
    }

    /// Outer HTML of every element matching the selectors, in selector order.
    fn extract(&self, page: &str) -> Result<String, EnhanceError> {
        let document = Html::parse_document(page);

        let extracted: String = self
            .selectors
            .iter()
            .flat_map(|(_, selector)| document.select(selector))
            .map(|element| element.html())
            .collect();

        if extracted.is_empty() {
            let wanted: Vec<&str> = self.selectors.iter().map(|(s, _)| s.as_str()).collect();
            return Err(EnhanceError::NoMatch(wanted.join(", ")));
        }

        Ok(extracted)
    }
}

#[async_trait]
impl ArticleEnhancer for SelectorEnhancer {
    async fn enhance(&self, article_url: &str, body: &str) -> Result<String, EnhanceError> {
        if !self.article.is_match(article_url) {
            return Ok(body.to_string());
        }

        let page = self
            .pages
            .page(article_url)
            .await
            .map_err(|e| EnhanceError::Fetch(e.to_string()))?;

        let extracted = self.extract(&page.body)?;
        Ok(self.sanitizer.sanitize_with_base(&extracted, &page.url))
    }
}
