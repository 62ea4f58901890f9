use std::path::Path;
use std::sync::Arc;

use crate::app::error::Result;
use crate::config::Config;
use crate::enhancer::{Enhancer, EnhancerTables};
use crate::fetcher::favicon::FaviconResolver;
use crate::fetcher::feed_fetcher::FeedFetcher;
use crate::fetcher::http::HttpClient;
use crate::fetcher::FetcherRegistry;
use crate::service::{FeedService, FolderService, ItemService};
use crate::store::{SqliteStore, Store};
use crate::updater::Updater;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub updater: Updater,
    pub folders: FolderService,
    pub feeds: FeedService,
    pub items: ItemService,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.database_path()?;
        Self::with_database(config, &db_path)
    }

    pub fn with_database(config: Config, db_path: &Path) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(db_path)?);
        Self::wire(config, store)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::wire(config, store)
    }

    fn wire(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let http = HttpClient::new(&config.fetch)?;
        let favicons = Arc::new(FaviconResolver::new(http.clone()));

        let tables = EnhancerTables::load(&config.enhancers)?;
        let enhancer: Arc<Enhancer> = Arc::new(tables.build(Arc::new(http.clone()))?);

        let fetchers = FetcherRegistry::new().with(Arc::new(FeedFetcher::new(
            http,
            enhancer,
            favicons.clone(),
        )));

        let shared: Arc<dyn Store> = store.clone();
        let updater = Updater::new(
            shared.clone(),
            fetchers,
            config.update.clone(),
            config.fetch.workers,
        )
        .with_favicons(favicons);

        let purge_after = config.update.purge_after();

        Ok(Self {
            folders: FolderService::new(shared.clone(), purge_after),
            feeds: FeedService::new(shared.clone(), updater.clone(), purge_after),
            items: ItemService::new(shared),
            updater,
            store,
            config,
        })
    }
}
