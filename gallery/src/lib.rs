pub mod clock;
pub mod debounce;
pub mod domain;
pub mod events;
pub mod janitor;
pub mod keys;
pub mod persistence;
pub mod ports;
pub mod provider;
pub mod query;
pub mod service;
pub mod session;
pub mod view;

pub use domain::{CacheEntry, Payload, Photo, QueryStatus, SearchResponse, Snapshot};
pub use keys::{CacheKey, photo_key, random_key, search_key};
pub use query::{Observer, QueryOptions, QueryStore};
pub use service::Gallery;
pub use session::BrowseSession;
