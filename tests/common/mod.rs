//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use feedmill::app::{FeedmillError, Result};
use feedmill::config::{FetchConfig, UpdateConfig};
use feedmill::domain::{Feed, Item, Validators};
use feedmill::fetcher::{FetchOutcome, FetchedFeed, Fetcher, FetcherRegistry};
use feedmill::store::{SqliteStore, Store};
use feedmill::updater::Updater;

/// What [`ScriptedFetcher`] answers for a URL.
#[derive(Clone)]
pub enum Script {
    Feed {
        title: String,
        items: Vec<Item>,
    },
    NotModified,
    Fail,
    /// Never answers.
    Hang,
}

/// In-process fetcher for `fake://` URLs answering from a script.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn set(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("fake://")
    }

    async fn fetch(&self, url: &str, _validators: &Validators) -> Result<FetchOutcome> {
        self.calls.lock().unwrap().push(url.to_string());
        let script = self.scripts.lock().unwrap().get(url).cloned();

        match script {
            Some(Script::Feed { title, items }) => Ok(FetchOutcome::Fetched(FetchedFeed {
                title: Some(title),
                link: Some(url.replace("fake://", "https://")),
                items,
                ..Default::default()
            })),
            Some(Script::NotModified) => Ok(FetchOutcome::NotModified),
            Some(Script::Hang) => std::future::pending::<Result<FetchOutcome>>().await,
            Some(Script::Fail) | None => {
                Err(FeedmillError::FeedFormat(format!("{} is not a feed", url)))
            }
        }
    }
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub updater: Updater,
}

pub fn harness(config: UpdateConfig) -> Harness {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let updater = Updater::new(
        store.clone(),
        FetcherRegistry::new().with(fetcher.clone()),
        config,
        FetchConfig::default().workers,
    );

    Harness {
        store,
        fetcher,
        updater,
    }
}

impl Harness {
    pub fn add_feed(&self, user: &str, url: &str) -> i64 {
        self.store.add_feed(&Feed::new(user, url)).unwrap()
    }

    pub fn feed(&self, id: i64) -> Feed {
        self.store.get_feed(id).unwrap().unwrap()
    }
}

pub fn timestamp(minutes: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + minutes * 60, 0).unwrap()
}

pub fn item(guid: &str, title: &str, minutes: i64) -> Item {
    let mut item = Item::new(guid);
    item.title = Some(title.to_string());
    item.url = Some(format!("https://example.com/{}", guid));
    item.body = Some(format!("<p>{}</p>", title));
    item.pub_date = Some(timestamp(minutes));
    item
}

pub fn feed_script(title: &str, items: Vec<Item>) -> Script {
    Script::Feed {
        title: title.to_string(),
        items,
    }
}
