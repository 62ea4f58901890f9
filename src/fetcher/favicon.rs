use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use scraper::{Html, Selector};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::fetcher::http::{HttpClient, Page, PageSource};

type Lookup = Arc<OnceCell<Option<String>>>;

/// Best-effort favicon discovery, cached per host.
///
/// Concurrent lookups for the same host wait on one shared request. The cache
/// lives until [`clear_cache`](Self::clear_cache), which the updater calls at
/// the start of every cycle.
pub struct FaviconResolver {
    http: HttpClient,
    cache: Mutex<HashMap<String, Lookup>>,
}

impl FaviconResolver {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Absolute URL of the site's icon, or `None` when nothing usable answers.
    pub async fn resolve(&self, site_url: &str) -> Option<String> {
        let url = match Url::parse(site_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(site = %site_url, error = %e, "cannot resolve favicon for invalid url");
                return None;
            }
        };
        let host = url.host_str()?.to_lowercase();

        let lookup = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(host).or_default().clone()
        };

        lookup.get_or_init(|| self.lookup(&url)).await.clone()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    async fn lookup(&self, url: &Url) -> Option<String> {
        match self.http.page(url.as_str()).await {
            Ok(page) => {
                if let Some(icon) = icon_from_page(&page) {
                    debug!(site = %url, icon = %icon, "favicon declared by page");
                    return Some(icon);
                }
            }
            Err(e) => warn!(site = %url, error = %e, "favicon page fetch failed"),
        }

        let fallback = url.join("/favicon.ico").ok()?;
        if self.http.is_reachable(fallback.as_str()).await {
            Some(fallback.into())
        } else {
            debug!(site = %url, "no favicon found");
            None
        }
    }
}

fn icon_from_page(page: &Page) -> Option<String> {
    let selector = Selector::parse(r#"link[rel~="icon"][href]"#).ok()?;
    let document = Html::parse_document(&page.body);
    let href = document.select(&selector).next()?.value().attr("href")?;

    Url::parse(&page.url).ok()?.join(href.trim()).ok().map(String::from)
}
