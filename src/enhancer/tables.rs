//! JSON enhancer tables.
//!
//! Both tables map a match key to a list of rules. Selector rules name the
//! CSS selectors to extract from the article page:
//!
//! ```json
//! { "explosm.net": [ { "article": "explosm\\.net/comics", "selectors": ["#main-comic"] } ] }
//! ```
//!
//! Regex rules list substitutions applied to the item body:
//!
//! ```json
//! { "example.com": [ { "article": "example\\.com/", "rewrites": [ { "pattern": "a", "replacement": "b" } ] } ] }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::{ConfigError, EnhancerConfig};
use crate::enhancer::{Enhancer, PatternEnhancer, SelectorEnhancer};
use crate::fetcher::http::PageSource;

const SELECTOR_TABLE: &str = include_str!("../../enhancers/selector_enhancers.json");
const REGEX_TABLE: &str = include_str!("../../enhancers/regex_enhancers.json");

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorRule {
    pub article: String,
    pub selectors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegexRule {
    pub article: String,
    pub rewrites: Vec<Rewrite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rewrite {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Default)]
pub struct EnhancerTables {
    pub selectors: BTreeMap<String, Vec<SelectorRule>>,
    pub regexes: BTreeMap<String, Vec<RegexRule>>,
}

impl EnhancerTables {
    /// Tables shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(Self {
            selectors: parse_table("selector_enhancers.json", SELECTOR_TABLE)?,
            regexes: parse_table("regex_enhancers.json", REGEX_TABLE)?,
        })
    }

    /// Built-in tables, each replaced by its configured file when set.
    pub fn load(config: &EnhancerConfig) -> Result<Self, ConfigError> {
        let mut tables = Self::builtin()?;

        if let Some(path) = &config.selector_table {
            tables.selectors = read_table(path)?;
        }
        if let Some(path) = &config.regex_table {
            tables.regexes = read_table(path)?;
        }

        Ok(tables)
    }

    /// Registers selector extractors before regex rewriters, each group in
    /// key order, so rewrites see the extracted article.
    pub fn build(&self, pages: Arc<dyn PageSource>) -> Result<Enhancer, ConfigError> {
        let mut enhancer = Enhancer::new();

        for (key, rules) in &self.selectors {
            for rule in rules {
                let strategy = SelectorEnhancer::new(&rule.article, &rule.selectors, pages.clone())
                    .map_err(|e| invalid_rule(key, e))?;
                enhancer.register(key, Arc::new(strategy));
            }
        }

        for (key, rules) in &self.regexes {
            for rule in rules {
                let rewrites: Vec<(String, String)> = rule
                    .rewrites
                    .iter()
                    .map(|r| (r.pattern.clone(), r.replacement.clone()))
                    .collect();
                let strategy = PatternEnhancer::new(&rule.article, &rewrites)
                    .map_err(|e| invalid_rule(key, e))?;
                enhancer.register(key, Arc::new(strategy));
            }
        }

        Ok(enhancer)
    }
}

fn invalid_rule(key: &str, error: impl std::fmt::Display) -> ConfigError {
    ConfigError::EnhancerTable {
        name: key.to_string(),
        reason: error.to_string(),
    }
}

fn parse_table<T: serde::de::DeserializeOwned>(name: &str, content: &str) -> Result<T, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::EnhancerTable {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn read_table<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_table(&path.display().to_string(), &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{FeedmillError, Result};
    use crate::fetcher::http::Page;
    use async_trait::async_trait;

    struct NoPages;

    struct StaticPage(&'static str);

    #[async_trait]
    impl PageSource for StaticPage {
        async fn page(&self, url: &str) -> Result<Page> {
            Ok(Page {
                url: url.to_string(),
                body: self.0.to_string(),
            })
        }
    }

    #[async_trait]
    impl PageSource for NoPages {
        async fn page(&self, url: &str) -> Result<Page> {
            Err(FeedmillError::Other(format!("{} not available offline", url)))
        }
    }

    #[test]
    fn test_builtin_tables_build() {
        let tables = EnhancerTables::builtin().unwrap();
        assert!(!tables.selectors.is_empty());
        assert!(!tables.regexes.is_empty());

        let enhancer = tables.build(Arc::new(NoPages)).unwrap();
        let rules = tables.selectors.values().map(Vec::len).sum::<usize>()
            + tables.regexes.values().map(Vec::len).sum::<usize>();
        assert_eq!(enhancer.len(), rules);
    }

    #[test]
    fn test_override_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regex.json");
        fs::write(
            &path,
            r#"{ "example.com": [ { "article": "example\\.com/", "rewrites": [ { "pattern": "cat", "replacement": "dog" } ] } ] }"#,
        )
        .unwrap();

        let config = EnhancerConfig {
            selector_table: None,
            regex_table: Some(path),
        };
        let tables = EnhancerTables::load(&config).unwrap();

        assert_eq!(tables.regexes.len(), 1);
        assert_eq!(tables.regexes["example.com"][0].rewrites[0].replacement, "dog");
        assert!(!tables.selectors.is_empty());
    }

    #[test]
    fn test_invalid_rule_is_config_error() {
        let mut tables = EnhancerTables::default();
        tables.selectors.insert(
            "example.com".into(),
            vec![SelectorRule {
                article: ".*".into(),
                selectors: vec!["div[".into()],
            }],
        );

        let result = tables.build(Arc::new(NoPages));
        assert!(matches!(result, Err(ConfigError::EnhancerTable { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result: std::result::Result<BTreeMap<String, Vec<RegexRule>>, _> =
            parse_table("broken.json", "{ not json");
        assert!(matches!(result, Err(ConfigError::EnhancerTable { .. })));
    }

    #[tokio::test]
    async fn test_builtin_regex_rule_applies() {
        let enhancer = EnhancerTables::builtin()
            .unwrap()
            .build(Arc::new(NoPages))
            .unwrap();

        let body = enhancer
            .enhance(
                "http://niceteethcomic.com/rss.xml",
                Some("http://niceteethcomic.com/archives/page119/"),
                r#"<img src="http://niceteethcomic.com/comics/p119_thumb.jpg">"#.into(),
            )
            .await;
        assert_eq!(body, r#"<img src="http://niceteethcomic.com/comics/p119.jpg">"#);
    }

    #[tokio::test]
    async fn test_rewrites_apply_to_extracted_article() {
        let mut tables = EnhancerTables::default();
        tables.selectors.insert(
            "ex.com".into(),
            vec![SelectorRule {
                article: r"ex\.com/".into(),
                selectors: vec!["#c".into()],
            }],
        );
        tables.regexes.insert(
            "ex.com".into(),
            vec![RegexRule {
                article: r"ex\.com/".into(),
                rewrites: vec![Rewrite {
                    pattern: "_thumb".into(),
                    replacement: String::new(),
                }],
            }],
        );

        let page = r#"<html><body><nav>menu</nav><div id="c"><img src="/a_thumb.png"></div></body></html>"#;
        let enhancer = tables.build(Arc::new(StaticPage(page))).unwrap();
        let body = enhancer
            .enhance("https://ex.com/feed", Some("https://ex.com/post/1"), "<p>teaser</p>".into())
            .await;

        assert_eq!(body, r#"<div><img src="https://ex.com/a.png"></div>"#);
    }

    #[tokio::test]
    async fn test_builtin_xkcd_caption_matches_sanitized_image() {
        let enhancer = EnhancerTables::builtin()
            .unwrap()
            .build(Arc::new(NoPages))
            .unwrap();

        let body = enhancer
            .enhance(
                "https://xkcd.com/rss.xml",
                Some("https://xkcd.com/327/"),
                r#"<img src="https://imgs.xkcd.com/comics/exploits_of_a_mom.png" alt="Exploits of a Mom" title="Her daughter is named Help">"#.into(),
            )
            .await;
        assert_eq!(
            body,
            r#"<img src="https://imgs.xkcd.com/comics/exploits_of_a_mom.png" alt="Exploits of a Mom" title="Her daughter is named Help"><p>Her daughter is named Help</p>"#
        );
    }
}
