// shared/src/lib.rs

/// Errors are `Clone` so a single failed fetch can be handed to every
/// observer waiting on the same key.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider returned {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure is worth another attempt against the provider.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(_) => true,
            Error::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Duration expressed in milliseconds, the unit every persisted timestamp uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Millis(pub i64);

impl Millis {
    pub const fn from_secs(secs: i64) -> Self {
        Millis(secs * 1000)
    }

    pub const fn from_mins(mins: i64) -> Self {
        Millis(mins * 60 * 1000)
    }

    pub const fn from_hours(hours: i64) -> Self {
        Millis(hours * 60 * 60 * 1000)
    }

    pub const fn from_days(days: i64) -> Self {
        Millis(days * 24 * 60 * 60 * 1000)
    }
}

pub mod config;
