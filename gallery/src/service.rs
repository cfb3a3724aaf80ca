use crate::domain::{CacheEntry, Payload};
use crate::keys::{CacheKey, QueryCategory, normalize_search_query, photo_key, random_key, search_key};
use crate::ports::PhotoProvider;
use crate::query::{QueryOptions, QueryStore};
use crate::view::{MIN_SEARCH_LENGTH, is_valid_query};
use shared::config::Config;
use std::sync::Arc;

/// Typed photo queries over one shared query store.
#[derive(Clone)]
pub struct Gallery {
    provider: Arc<dyn PhotoProvider>,
    store: QueryStore<Payload>,
    per_page: u32,
    min_search_length: usize,
}

impl Gallery {
    pub fn new(provider: Arc<dyn PhotoProvider>, store: QueryStore<Payload>) -> Self {
        Self {
            provider,
            store,
            per_page: Config::DEFAULT_PER_PAGE,
            min_search_length: MIN_SEARCH_LENGTH,
        }
    }

    pub fn from_config(
        provider: Arc<dyn PhotoProvider>,
        store: QueryStore<Payload>,
        config: &Config,
    ) -> Self {
        Self {
            per_page: config.per_page,
            min_search_length: config.min_search_length,
            ..Self::new(provider, store)
        }
    }

    pub fn store(&self) -> &QueryStore<Payload> {
        &self.store
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn min_search_length(&self) -> usize {
        self.min_search_length
    }

    pub fn search_key(&self, query: &str, page: u32) -> CacheKey {
        search_key(query, page, self.per_page)
    }

    pub fn random_key(&self) -> CacheKey {
        random_key(self.per_page)
    }

    /// Search queries shorter than the minimum length are disabled: they
    /// return whatever is cached and never reach the provider.
    pub fn search_options(&self, query: &str) -> QueryOptions {
        QueryOptions::for_category(QueryCategory::Search)
            .enabled(is_valid_query(query, self.min_search_length))
    }

    pub async fn search(&self, query: &str, page: u32) -> CacheEntry<Payload> {
        let (key, fetcher, options) = self.search_query(query, page);
        self.store.get(key, fetcher, options).await
    }

    pub fn ensure_search(&self, query: &str, page: u32) -> CacheEntry<Payload> {
        let (key, fetcher, options) = self.search_query(query, page);
        self.store.ensure(key, fetcher, options)
    }

    pub async fn random(&self) -> CacheEntry<Payload> {
        let (key, fetcher, options) = self.random_query();
        self.store.get(key, fetcher, options).await
    }

    pub fn ensure_random(&self) -> CacheEntry<Payload> {
        let (key, fetcher, options) = self.random_query();
        self.store.ensure(key, fetcher, options)
    }

    pub async fn photo(&self, id: &str) -> CacheEntry<Payload> {
        let (key, fetcher, options) = self.photo_query(id);
        self.store.get(key, fetcher, options).await
    }

    pub fn ensure_photo(&self, id: &str) -> CacheEntry<Payload> {
        let (key, fetcher, options) = self.photo_query(id);
        self.store.ensure(key, fetcher, options)
    }

    fn search_query(
        &self,
        query: &str,
        page: u32,
    ) -> (CacheKey, PayloadFetcher, QueryOptions) {
        let provider = self.provider.clone();
        let normalized = normalize_search_query(query);
        let per_page = self.per_page;
        let fetcher: PayloadFetcher = Box::new(move || -> PayloadFuture {
            let provider = provider.clone();
            let query = normalized.clone();
            Box::pin(async move {
                provider
                    .search_photos(&query, page, per_page)
                    .await
                    .map(Payload::Search)
            })
        });
        (self.search_key(query, page), fetcher, self.search_options(query))
    }

    fn random_query(&self) -> (CacheKey, PayloadFetcher, QueryOptions) {
        let provider = self.provider.clone();
        let count = self.per_page;
        let fetcher: PayloadFetcher = Box::new(move || -> PayloadFuture {
            let provider = provider.clone();
            Box::pin(async move { provider.random_photos(count).await.map(Payload::Photos) })
        });
        (
            self.random_key(),
            fetcher,
            QueryOptions::for_category(QueryCategory::Random),
        )
    }

    fn photo_query(&self, id: &str) -> (CacheKey, PayloadFetcher, QueryOptions) {
        let provider = self.provider.clone();
        let photo_id = id.to_string();
        let fetcher: PayloadFetcher = Box::new(move || -> PayloadFuture {
            let provider = provider.clone();
            let id = photo_id.clone();
            Box::pin(async move { provider.photo_by_id(&id).await.map(Payload::Photo) })
        });
        let options = QueryOptions::for_category(QueryCategory::Photo).enabled(!id.trim().is_empty());
        (photo_key(id), fetcher, options)
    }
}

type PayloadFuture = futures::future::BoxFuture<'static, shared::Result<Payload>>;
type PayloadFetcher = Box<dyn Fn() -> PayloadFuture + Send + Sync>;
