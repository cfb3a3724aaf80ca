mod unsplash;

pub use unsplash::{DEFAULT_REQUEST_TIMEOUT, UnsplashClient};
