use crate::keys::CacheKey;
use serde::{Deserialize, Serialize};
use shared::{Error, Millis};

pub mod photo {
    use serde::{Deserialize, Serialize};

    /// Photo record as returned by the provider. Passed through untouched.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Photo {
        pub id: String,
        #[serde(default)]
        pub created_at: Option<String>,
        #[serde(default)]
        pub updated_at: Option<String>,
        #[serde(default)]
        pub width: u32,
        #[serde(default)]
        pub height: u32,
        #[serde(default)]
        pub color: Option<String>,
        #[serde(default)]
        pub blur_hash: Option<String>,
        #[serde(default)]
        pub likes: u64,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub alt_description: Option<String>,
        pub urls: PhotoUrls,
        pub user: PhotoUser,
    }

    impl Photo {
        /// Best available caption: description, then alt text.
        pub fn caption(&self) -> Option<&str> {
            self.description
                .as_deref()
                .or(self.alt_description.as_deref())
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct PhotoUrls {
        #[serde(default)]
        pub raw: String,
        #[serde(default)]
        pub full: String,
        pub regular: String,
        #[serde(default)]
        pub small: String,
        #[serde(default)]
        pub thumb: String,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct PhotoUser {
        #[serde(default)]
        pub id: String,
        #[serde(default)]
        pub username: String,
        pub name: String,
        #[serde(default)]
        pub portfolio_url: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct SearchResponse {
        pub total: u64,
        pub total_pages: u32,
        pub results: Vec<Photo>,
    }
}

pub use photo::{Photo, PhotoUrls, PhotoUser, SearchResponse};

/// Everything the gallery keeps in its query store. Untagged so the
/// persisted form is the provider's JSON unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Search(SearchResponse),
    Photos(Vec<Photo>),
    Photo(Photo),
}

impl Payload {
    pub fn as_search(&self) -> Option<&SearchResponse> {
        match self {
            Payload::Search(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_photos(&self) -> Option<&[Photo]> {
        match self {
            Payload::Photos(photos) => Some(photos),
            _ => None,
        }
    }

    pub fn as_photo(&self) -> Option<&Photo> {
        match self {
            Payload::Photo(photo) => Some(photo),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// No data and no error yet.
    Pending,
    Success,
    Error,
}

/// Observable state of one cached request.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub status: QueryStatus,
    pub data: Option<V>,
    /// Present iff `status` is `Error`.
    pub error: Option<Error>,
    /// Last failed revalidation of an entry that kept its data.
    pub refetch_error: Option<Error>,
    pub fetched_at: Option<i64>,
    pub stale_after: Millis,
    pub evict_after: Millis,
    pub is_fetching: bool,
    pub is_invalidated: bool,
}

impl<V> CacheEntry<V> {
    pub fn pending(stale_after: Millis, evict_after: Millis) -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            refetch_error: None,
            fetched_at: None,
            stale_after,
            evict_after,
            is_fetching: false,
            is_invalidated: false,
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Data exists but its freshness window has passed or it was invalidated.
    pub fn is_stale(&self, now_ms: i64) -> bool {
        match self.fetched_at {
            Some(fetched_at) => self.is_invalidated || now_ms - fetched_at >= self.stale_after.0,
            None => true,
        }
    }

    /// No data to show yet and a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Pending && self.is_fetching
    }
}

/// Success-only projection of an entry, the unit persisted to storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DehydratedState<V> {
    pub status: QueryStatus,
    pub data: V,
    pub fetched_at: i64,
    pub stale_after: i64,
    pub evict_after: i64,
}

impl<V: Clone> DehydratedState<V> {
    pub fn from_entry(entry: &CacheEntry<V>) -> Option<Self> {
        if entry.status != QueryStatus::Success {
            return None;
        }
        Some(Self {
            status: QueryStatus::Success,
            data: entry.data.clone()?,
            fetched_at: entry.fetched_at?,
            stale_after: entry.stale_after.0,
            evict_after: entry.evict_after.0,
        })
    }

    pub fn into_entry(self) -> CacheEntry<V> {
        CacheEntry {
            status: QueryStatus::Success,
            data: Some(self.data),
            error: None,
            refetch_error: None,
            fetched_at: Some(self.fetched_at),
            stale_after: Millis(self.stale_after),
            evict_after: Millis(self.evict_after),
            is_fetching: false,
            is_invalidated: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DehydratedQuery<V> {
    pub key: CacheKey,
    pub state: DehydratedState<V>,
}

/// Success entries of a store at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<V> {
    pub queries: Vec<DehydratedQuery<V>>,
}

impl<V> Snapshot<V> {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
        }
    }
}
