use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, Proxy, StatusCode};

use crate::app::{FeedmillError, Result};
use crate::config::FetchConfig;
use crate::domain::Validators;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum ConditionalResponse {
    /// New content fetched successfully
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// Content not modified (HTTP 304)
    NotModified,
}

/// An HTML page retrieved for favicon discovery or article extraction.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

/// Source of full article pages for enhancers.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn page(&self, url: &str) -> Result<Page>;
}

/// Shared HTTP client. Cloning is cheap and shares the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(MAX_CONNECT_TIMEOUT))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str());

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    pub async fn conditional_get(
        &self,
        url: &str,
        validators: &Validators,
    ) -> Result<ConditionalResponse> {
        let mut headers = HeaderMap::new();

        if let Some(etag) = &validators.etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }

        if let Some(last_modified) = &validators.last_modified {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }

        let response = self.client.get(url).headers(headers).send().await?;

        match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(ConditionalResponse::NotModified),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FeedmillError::Unauthorized(format!(
                    "{} answered {}",
                    url,
                    response.status()
                )));
            }
            _ => {}
        }

        response.error_for_status_ref()?;

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response.bytes().await?.to_vec();

        Ok(ConditionalResponse::Content {
            body,
            etag,
            last_modified,
        })
    }

    /// True when `url` answers with a non-HTML success response.
    pub async fn is_reachable(&self, url: &str) -> bool {
        let Ok(response) = self.client.get(url).send().await else {
            return false;
        };

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"));

        response.status().is_success() && !is_html
    }
}

#[async_trait]
impl PageSource for HttpClient {
    async fn page(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        let url = response.url().to_string();
        let body = response.text().await?;

        Ok(Page { url, body })
    }
}
