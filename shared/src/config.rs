use tracing::warn;

pub struct Config {
    pub api_url: String,
    pub access_key: Option<String>,
    pub data_dir: String,
    pub debounce_ms: u64,
    pub min_search_length: usize,
    pub per_page: u32,
    pub persist_throttle_ms: u64,
    pub cache_buster: String,
}

impl Config {
    pub const DEFAULT_API_URL: &'static str = "https://api.unsplash.com";
    pub const DEFAULT_DATA_DIR: &'static str = "./data";
    pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
    pub const DEFAULT_MIN_SEARCH_LENGTH: usize = 3;
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const DEFAULT_PERSIST_THROTTLE_MS: u64 = 1000;
    pub const DEFAULT_CACHE_BUSTER: &'static str = "v1";

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let access_key = lookup("UNSPLASH_ACCESS_KEY").filter(|key| !key.trim().is_empty());
        if access_key.is_none() {
            warn!("UNSPLASH_ACCESS_KEY not set, provider requests will be rejected");
        }

        Self {
            api_url: lookup("UNSPLASH_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| Self::DEFAULT_API_URL.to_string()),
            access_key,
            data_dir: lookup("GALLERY_DATA_DIR")
                .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string()),
            debounce_ms: parse_or(&lookup, "GALLERY_DEBOUNCE_MS", Self::DEFAULT_DEBOUNCE_MS),
            min_search_length: parse_or(
                &lookup,
                "GALLERY_MIN_SEARCH_LENGTH",
                Self::DEFAULT_MIN_SEARCH_LENGTH,
            ),
            per_page: parse_or(&lookup, "GALLERY_PER_PAGE", Self::DEFAULT_PER_PAGE),
            persist_throttle_ms: parse_or(
                &lookup,
                "GALLERY_PERSIST_THROTTLE_MS",
                Self::DEFAULT_PERSIST_THROTTLE_MS,
            ),
            cache_buster: lookup("GALLERY_CACHE_BUSTER")
                .unwrap_or_else(|| Self::DEFAULT_CACHE_BUSTER.to_string()),
        }
    }

    pub fn sled_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("gallery-cache.sled")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default", name, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, "https://api.unsplash.com");
        assert_eq!(config.debounce_ms, 400);
        assert_eq!(config.min_search_length, 3);
        assert_eq!(config.per_page, 20);
        assert_eq!(config.persist_throttle_ms, 1000);
        assert_eq!(config.cache_buster, "v1");
        assert!(config.access_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("UNSPLASH_ACCESS_KEY", "abc"),
            ("UNSPLASH_API_URL", "http://localhost:9000/"),
            ("GALLERY_DEBOUNCE_MS", "250"),
            ("GALLERY_PER_PAGE", "30"),
            ("GALLERY_CACHE_BUSTER", "v2"),
        ]);
        assert_eq!(config.access_key.as_deref(), Some("abc"));
        assert_eq!(config.api_url, "http://localhost:9000");
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.per_page, 30);
        assert_eq!(config.cache_buster, "v2");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[
            ("GALLERY_DEBOUNCE_MS", "soon"),
            ("GALLERY_MIN_SEARCH_LENGTH", "-1"),
            ("UNSPLASH_ACCESS_KEY", "   "),
        ]);
        assert_eq!(config.debounce_ms, 400);
        assert_eq!(config.min_search_length, 3);
        assert!(config.access_key.is_none());
    }

    #[test]
    fn test_sled_path_under_data_dir() {
        let config = config_from(&[("GALLERY_DATA_DIR", "/tmp/gallery")]);
        assert_eq!(
            config.sled_path(),
            std::path::PathBuf::from("/tmp/gallery/gallery-cache.sled")
        );
    }
}
