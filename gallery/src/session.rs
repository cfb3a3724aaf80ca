use crate::domain::{CacheEntry, Payload};
use crate::keys::{CacheKey, photo_key};
use crate::query::Observer;
use crate::service::Gallery;
use crate::view::{FetchState, Pager, ViewInput, ViewModel, is_valid_query, select_view};
use tracing::debug;

/// One user's browsing state: what was typed, what has settled, which page
/// is shown and which queries are being watched.
///
/// Only the query currently on screen is observed, so moving to another
/// search or page cancels the fetch that is no longer wanted.
pub struct BrowseSession {
    gallery: Gallery,
    raw_query: String,
    debounced_query: String,
    pager: Pager,
    search: Option<Observer<Payload>>,
    random: Observer<Payload>,
    /// Photo detail requested but not settled yet.
    photo: Option<Observer<Payload>>,
}

impl BrowseSession {
    pub fn new(gallery: Gallery) -> Self {
        let random = gallery.store().observe(gallery.random_key());
        let mut session = Self {
            gallery,
            raw_query: String::new(),
            debounced_query: String::new(),
            pager: Pager::new(),
            search: None,
            random,
            photo: None,
        };
        session.refresh();
        session
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn debounced_query(&self) -> &str {
        &self.debounced_query
    }

    pub fn page(&self) -> u32 {
        self.pager.page()
    }

    /// Key of the search on screen, if the settled query is long enough.
    pub fn search_key(&self) -> Option<&CacheKey> {
        self.search.as_ref().map(Observer::key)
    }

    /// Record keystrokes that have not settled yet.
    pub fn set_raw_query(&mut self, raw: impl Into<String>) {
        self.raw_query = raw.into();
    }

    /// Apply a settled query: reset paging if it changed and start fetching.
    pub fn apply_debounced(&mut self, debounced: impl Into<String>) {
        self.record_total_pages();
        self.debounced_query = debounced.into();
        if self.pager.sync_query(&self.debounced_query) {
            debug!(query = %self.debounced_query, "search query changed");
        }
        self.refresh();
    }

    pub fn go_to_page(&mut self, page: u32) -> u32 {
        self.turn_page(|pager| pager.go_to(page))
    }

    pub fn next_page(&mut self) -> u32 {
        self.turn_page(Pager::next)
    }

    pub fn prev_page(&mut self) -> u32 {
        self.turn_page(Pager::prev)
    }

    fn turn_page(&mut self, turn: impl FnOnce(&mut Pager) -> u32) -> u32 {
        self.record_total_pages();
        let page = turn(&mut self.pager);
        self.refresh();
        page
    }

    /// Pages of the current search. While a page is loading this is the
    /// count last reported for the same query, or 1 before any data.
    pub fn total_pages(&self) -> u32 {
        self.loaded_total_pages()
            .unwrap_or_else(|| self.pager.total_pages())
    }

    fn loaded_total_pages(&self) -> Option<u32> {
        self.search_entry()?
            .data?
            .as_search()
            .map(|response| response.total_pages)
    }

    fn record_total_pages(&mut self) {
        if let Some(total_pages) = self.loaded_total_pages() {
            self.pager.record_total_pages(total_pages);
        }
    }

    /// Point the observers at the current query and page and start whatever
    /// fetches they need.
    pub fn refresh(&mut self) {
        self.gallery.ensure_random();

        if !is_valid_query(&self.debounced_query, self.gallery.min_search_length()) {
            self.search = None;
            return;
        }

        let key = self.gallery.search_key(&self.debounced_query, self.pager.page());
        if self.search_key() != Some(&key) {
            // Attach before detaching so a shared key never drops to zero.
            let observer = self.gallery.store().observe(key);
            self.search = Some(observer);
        }
        self.gallery.ensure_search(&self.debounced_query, self.pager.page());
    }

    /// Start loading a photo's details without waiting for the provider.
    ///
    /// Returns the entry right away when nothing needs fetching. Otherwise the
    /// photo is watched until [`settled_photo`](Self::settled_photo) hands it
    /// over; opening another photo first cancels this one.
    pub fn open_photo(&mut self, id: &str) -> Option<CacheEntry<Payload>> {
        let observer = self.gallery.store().observe(photo_key(id));
        let entry = self.gallery.ensure_photo(id);
        if entry.is_fetching {
            self.photo = Some(observer);
            None
        } else {
            self.photo = None;
            Some(entry)
        }
    }

    /// The pending photo's entry, once a change to `key` has settled it.
    pub fn settled_photo(&mut self, key: &CacheKey) -> Option<CacheEntry<Payload>> {
        let observer = self.photo.as_ref().filter(|observer| observer.key() == key)?;
        let entry = observer.entry().filter(|entry| !entry.is_fetching)?;
        self.photo = None;
        Some(entry)
    }

    pub fn search_entry(&self) -> Option<CacheEntry<Payload>> {
        self.search.as_ref().and_then(Observer::entry)
    }

    pub fn random_entry(&self) -> Option<CacheEntry<Payload>> {
        self.random.entry()
    }

    pub fn render(&self) -> ViewModel {
        let search = self.search_entry();
        let random = self.random_entry();
        select_view(&ViewInput {
            raw_query: &self.raw_query,
            debounced_query: &self.debounced_query,
            search: FetchState::from_entry(search.as_ref(), Payload::as_search),
            random: FetchState::from_entry(random.as_ref(), Payload::as_photos),
            page: self.pager.page(),
            min_search_length: self.gallery.min_search_length(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::{DEFAULT_DEBOUNCE, Debouncer};
    use crate::keys::search_key;
    use crate::query::QueryStore;
    use crate::service::fake::FakeProvider;
    use crate::view::DisplayVariant;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn session() -> (BrowseSession, Arc<FakeProvider>) {
        let provider = Arc::new(FakeProvider::default());
        let gallery = Gallery::new(provider.clone(), QueryStore::new());
        (BrowseSession::new(gallery), provider)
    }

    async fn settle(session: &BrowseSession) {
        let store = session.gallery().store();
        store.settled(&session.gallery().random_key()).await;
        if let Some(key) = session.search_key() {
            store.settled(key).await;
        }
    }

    #[tokio::test]
    async fn test_short_query_shows_featured_photos() {
        let (mut session, provider) = session();
        session.set_raw_query("mo");
        session.apply_debounced("mo");
        settle(&session).await;

        assert_eq!(provider.search_count(), 0);
        assert_eq!(provider.random_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            session.render().variant,
            DisplayVariant::Featured { ref photos } if photos.len() == 3
        ));
    }

    #[tokio::test]
    async fn test_valid_query_fetches_first_page() {
        let (mut session, provider) = session();
        session.set_raw_query("mou");
        assert!(session.render().is_searching);

        session.apply_debounced("mou");
        assert_eq!(session.search_key(), Some(&search_key("mou", 1, 20)));
        settle(&session).await;

        assert_eq!(provider.searches.lock().clone(), vec![("mou".to_string(), 1, 20)]);
        let view = session.render();
        assert!(!view.is_searching);
        match view.variant {
            DisplayVariant::SearchResults { query, page, total_pages, .. } => {
                assert_eq!(query, "mou");
                assert_eq!(page, 1);
                assert_eq!(total_pages, 5);
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paging_resets_on_new_query() {
        let (mut session, provider) = session();
        session.apply_debounced("forest");
        settle(&session).await;

        assert_eq!(session.go_to_page(3), 3);
        settle(&session).await;
        assert_eq!(session.go_to_page(99), 5);
        settle(&session).await;
        assert_eq!(session.prev_page(), 4);
        settle(&session).await;

        session.apply_debounced("desert");
        assert_eq!(session.page(), 1);
        settle(&session).await;
        assert_eq!(
            provider.searches.lock().last().cloned(),
            Some(("desert".to_string(), 1, 20))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_paging_while_a_page_loads_keeps_page_count() {
        let (mut session, provider) = session();
        session.apply_debounced("forest");
        settle(&session).await;
        assert_eq!(session.total_pages(), 5);

        *provider.delay.lock() = Duration::from_secs(5);
        assert_eq!(session.next_page(), 2);
        assert!(session.search_entry().unwrap().data.is_none());
        assert_eq!(session.total_pages(), 5);

        assert_eq!(session.next_page(), 3);
        assert_eq!(session.go_to_page(9), 5);
        assert_eq!(session.prev_page(), 4);

        settle(&session).await;
        assert_eq!(
            provider.searches.lock().last().cloned(),
            Some(("forest".to_string(), 4, 20))
        );
        assert!(matches!(
            session.render().variant,
            DisplayVariant::SearchResults { page: 4, total_pages: 5, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_fetches_once() {
        let (mut session, provider) = session();
        let mut debouncer = Debouncer::spawn(DEFAULT_DEBOUNCE);

        for (text, pause) in [("c", 100), ("ca", 150), ("cat", 0)] {
            session.set_raw_query(text);
            debouncer.push(text.to_string());
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }

        let settled = debouncer.recv().await.unwrap();
        assert_eq!(settled, "cat");
        session.apply_debounced(settled);
        settle(&session).await;

        let quiet = tokio::time::timeout(Duration::from_secs(1), debouncer.recv()).await;
        assert!(quiet.is_err());
        assert_eq!(provider.searches.lock().clone(), vec![("cat".to_string(), 1, 20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_photo_does_not_wait_for_the_provider() {
        let (mut session, provider) = session();
        *provider.delay.lock() = Duration::from_secs(5);
        let mut events = session.gallery().store().subscribe();

        assert!(session.open_photo("Dwu85P9SOIk").is_none());
        let key = photo_key("Dwu85P9SOIk");
        assert!(session.settled_photo(&key).is_none());

        let entry = loop {
            let event = events.recv().await.unwrap();
            if let Some(entry) = event.key().and_then(|key| session.settled_photo(key)) {
                break entry;
            }
        };
        let photo = entry.data.as_ref().and_then(Payload::as_photo).unwrap();
        assert_eq!(photo.id, "Dwu85P9SOIk");
        assert!(session.settled_photo(&key).is_none());

        // Cached now, so the second request answers immediately.
        assert!(session.open_photo("Dwu85P9SOIk").is_some());
        assert_eq!(provider.photo_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_another_photo_cancels_the_pending_one() {
        let (mut session, provider) = session();
        *provider.delay.lock() = Duration::from_secs(5);
        let store = session.gallery().store().clone();

        assert!(session.open_photo("first").is_none());
        assert!(store.peek(&photo_key("first")).unwrap().is_fetching);

        assert!(session.open_photo("second").is_none());
        assert!(!store.peek(&photo_key("first")).unwrap().is_fetching);
        assert_eq!(store.observer_count(&photo_key("first")), 0);
        assert!(session.settled_photo(&photo_key("first")).is_none());

        let entry = store.settled(&photo_key("second")).await.unwrap();
        assert!(entry.data.is_some());
        assert!(session.settled_photo(&photo_key("second")).is_some());
    }

    #[tokio::test]
    async fn test_no_results_state() {
        let (mut session, _provider) = session();
        session.apply_debounced("xyzzy");
        settle(&session).await;
        assert_eq!(
            session.render().variant,
            DisplayVariant::NoResults {
                query: "xyzzy".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_query_cancels_superseded_search() {
        let (mut session, provider) = session();
        *provider.delay.lock() = Duration::from_secs(5);

        session.apply_debounced("mountain");
        let superseded = search_key("mountain", 1, 20);
        let store = session.gallery().store().clone();
        assert!(store.peek(&superseded).unwrap().is_fetching);

        session.apply_debounced("river");
        let entry = store.peek(&superseded).unwrap();
        assert!(!entry.is_fetching);
        assert_eq!(store.observer_count(&superseded), 0);

        settle(&session).await;
        assert!(store.peek(&superseded).unwrap().data.is_none());
        assert!(matches!(
            session.render().variant,
            DisplayVariant::SearchResults { .. }
        ));
    }

    #[tokio::test]
    async fn test_search_error_state() {
        let (mut session, provider) = session();
        provider.fail.store(true, Ordering::SeqCst);
        session.apply_debounced("cats");
        settle(&session).await;
        assert!(matches!(
            session.render().variant,
            DisplayVariant::Error { .. }
        ));
    }
}
