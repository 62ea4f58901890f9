use async_trait::async_trait;
use regex::Regex;

use crate::enhancer::{ArticleEnhancer, EnhanceError};

/// Applies ordered regex substitutions to bodies of matching articles.
pub struct PatternEnhancer {
    article: Regex,
    rewrites: Vec<(Regex, String)>,
}

impl PatternEnhancer {
    pub fn new(article: &str, rewrites: &[(String, String)]) -> Result<Self, EnhanceError> {
        let rewrites = rewrites
            .iter()
            .map(|(pattern, replacement)| Ok((compile(pattern)?, replacement.clone())))
            .collect::<Result<Vec<_>, EnhanceError>>()?;

        Ok(Self {
            article: compile(article)?,
            rewrites,
        })
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex, EnhanceError> {
    Regex::new(pattern).map_err(|source| EnhanceError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[async_trait]
impl ArticleEnhancer for PatternEnhancer {
    async fn enhance(&self, article_url: &str, body: &str) -> Result<String, EnhanceError> {
        if !self.article.is_match(article_url) {
            return Ok(body.to_string());
        }

        let mut body = body.to_string();
        for (pattern, replacement) in &self.rewrites {
            body = pattern.replace_all(&body, replacement.as_str()).into_owned();
        }
        Ok(body)
    }
}
