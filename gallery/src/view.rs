use crate::domain::{CacheEntry, Payload, Photo, QueryStatus, SearchResponse};
use crate::keys::normalize_search_query;

pub const MIN_SEARCH_LENGTH: usize = 3;
pub const SEARCH_ERROR_MESSAGE: &str =
    "Failed to fetch photos. Please check your API key and try again.";

/// What the presentation layer needs to know about one query.
#[derive(Debug)]
pub struct FetchState<'a, T: ?Sized> {
    pub data: Option<&'a T>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    pub is_fetching: bool,
    /// Failed without any data to fall back on.
    pub failed: bool,
}

impl<T: ?Sized> Clone for FetchState<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for FetchState<'_, T> {}

impl<T: ?Sized> Default for FetchState<'_, T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_fetching: false,
            failed: false,
        }
    }
}

impl<'a, T: ?Sized> FetchState<'a, T> {
    pub fn from_entry(
        entry: Option<&'a CacheEntry<Payload>>,
        project: impl Fn(&'a Payload) -> Option<&'a T>,
    ) -> Self {
        match entry {
            Some(entry) => Self {
                data: entry.data.as_ref().and_then(project),
                is_loading: entry.is_loading(),
                is_fetching: entry.is_fetching,
                failed: entry.status == QueryStatus::Error,
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ViewInput<'a> {
    pub raw_query: &'a str,
    pub debounced_query: &'a str,
    pub search: FetchState<'a, SearchResponse>,
    pub random: FetchState<'a, [Photo]>,
    pub page: u32,
    pub min_search_length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayVariant {
    Loading,
    /// Random photos shown while no valid search is active.
    Featured { photos: Vec<Photo> },
    /// No valid search and nothing featured to show.
    NoSearch,
    Error { message: String },
    NoResults { query: String },
    SearchResults {
        query: String,
        total: u64,
        photos: Vec<Photo>,
        page: u32,
        total_pages: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub variant: DisplayVariant,
    /// Input is long enough and either still settling or being fetched.
    pub is_searching: bool,
}

pub fn is_valid_query(query: &str, min_search_length: usize) -> bool {
    query.trim().chars().count() >= min_search_length
}

/// Counts raw characters, untrimmed, so whitespace-only input long enough
/// to pass the length check still shows the indicator while it settles.
pub fn is_searching(input: &ViewInput<'_>) -> bool {
    input.raw_query.chars().count() >= input.min_search_length
        && (input.raw_query != input.debounced_query || input.search.is_fetching)
}

/// Decide what to display. Pure: the same input always yields the same view.
pub fn select_view(input: &ViewInput<'_>) -> ViewModel {
    let query = input.debounced_query.trim();
    let variant = if !is_valid_query(query, input.min_search_length) {
        let random = input.random;
        match random.data {
            _ if random.is_loading => DisplayVariant::Loading,
            Some(photos) if !photos.is_empty() => DisplayVariant::Featured {
                photos: photos.to_vec(),
            },
            _ => DisplayVariant::NoSearch,
        }
    } else {
        let search = input.search;
        match search.data {
            _ if search.is_loading => DisplayVariant::Loading,
            _ if search.failed => DisplayVariant::Error {
                message: SEARCH_ERROR_MESSAGE.to_string(),
            },
            Some(response) if !response.results.is_empty() => DisplayVariant::SearchResults {
                query: query.to_string(),
                total: response.total,
                photos: response.results.clone(),
                page: input.page,
                total_pages: response.total_pages,
            },
            _ => DisplayVariant::NoResults {
                query: query.to_string(),
            },
        }
    };

    ViewModel {
        variant,
        is_searching: is_searching(input),
    }
}

/// Current page of the active search, plus the last page count the
/// provider reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    page: u32,
    total_pages: u32,
    query: String,
}

impl Default for Pager {
    fn default() -> Self {
        Self {
            page: 1,
            total_pages: 1,
            query: String::new(),
        }
    }
}

impl Pager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Remember the page count from search data for the current query. It
    /// stays in force while other pages of the same query are loading.
    pub fn record_total_pages(&mut self, total_pages: u32) {
        self.total_pages = total_pages.max(1);
    }

    /// Track the debounced query; any change of its normalized value,
    /// including crossing the length threshold, resets to page 1.
    pub fn sync_query(&mut self, debounced_query: &str) -> bool {
        let normalized = normalize_search_query(debounced_query);
        if normalized == self.query {
            return false;
        }
        self.query = normalized;
        self.page = 1;
        self.total_pages = 1;
        true
    }

    /// Move to `page`, clamped to the known page count.
    pub fn go_to(&mut self, page: u32) -> u32 {
        self.page = page.clamp(1, self.total_pages);
        self.page
    }

    pub fn next(&mut self) -> u32 {
        self.go_to(self.page.saturating_add(1))
    }

    pub fn prev(&mut self) -> u32 {
        self.go_to(self.page.saturating_sub(1))
    }
}
