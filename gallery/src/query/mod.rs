mod options;
mod retry;
mod store;

pub use options::{DEFAULT_RETRY_DELAY, MAX_RETRY_DELAY, QueryOptions};
pub use retry::RetryPolicy;
pub use store::{Observer, QueryStore};
