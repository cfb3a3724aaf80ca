use serde::{Deserialize, Serialize};
use shared::Millis;
use std::fmt;

pub const SEARCH_TAG: &str = "search";
pub const PHOTO_TAG: &str = "photo";
pub const RANDOM_TAG: &str = "random";

/// One element of a cache key. Serialized untagged so a key persists as a
/// plain JSON array such as `["search","cats",1,20]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(u64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(value as u64)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Ordered tuple identifying one cached request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(pub Vec<KeyPart>);

impl CacheKey {
    pub fn new(parts: impl IntoIterator<Item = KeyPart>) -> Self {
        CacheKey(parts.into_iter().collect())
    }

    pub fn tag(&self) -> Option<&str> {
        match self.0.first() {
            Some(KeyPart::Str(tag)) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<QueryCategory> {
        match self.tag()? {
            SEARCH_TAG => Some(QueryCategory::Search),
            PHOTO_TAG => Some(QueryCategory::Photo),
            RANDOM_TAG => Some(QueryCategory::Random),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

/// Request families with their own freshness and retention windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryCategory {
    Search,
    Photo,
    Random,
}

impl QueryCategory {
    pub fn stale_after(&self) -> Millis {
        match self {
            QueryCategory::Search => Millis::from_mins(15),
            QueryCategory::Photo => Millis::from_mins(30),
            QueryCategory::Random => Millis::from_mins(5),
        }
    }

    pub fn evict_after(&self) -> Millis {
        match self {
            QueryCategory::Search => Millis::from_hours(1),
            QueryCategory::Photo => Millis::from_hours(24),
            QueryCategory::Random => Millis::from_mins(10),
        }
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            QueryCategory::Photo => 2,
            QueryCategory::Search | QueryCategory::Random => 1,
        }
    }
}

/// Trim and lower-case a search query so equivalent inputs share a key.
pub fn normalize_search_query(query: &str) -> String {
    query.trim().to_lowercase()
}

pub fn search_key(query: &str, page: u32, per_page: u32) -> CacheKey {
    CacheKey(vec![
        SEARCH_TAG.into(),
        normalize_search_query(query).into(),
        page.into(),
        per_page.into(),
    ])
}

pub fn photo_key(id: &str) -> CacheKey {
    CacheKey(vec![PHOTO_TAG.into(), id.into()])
}

pub fn random_key(count: u32) -> CacheKey {
    CacheKey(vec![RANDOM_TAG.into(), count.into()])
}
