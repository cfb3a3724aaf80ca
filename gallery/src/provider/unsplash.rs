use crate::domain::{Photo, SearchResponse};
use crate::ports::PhotoProvider;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::config::Config;
use shared::{Error, Result};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const API_VERSION: &str = "v1";

/// Unsplash REST adapter.
#[derive(Clone)]
pub struct UnsplashClient {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

impl UnsplashClient {
    pub fn new(base_url: &str, access_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(auth_headers(access_key)?)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API URL {}: {}", base_url, e)))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let access_key = config
            .access_key
            .as_deref()
            .ok_or_else(|| Error::Config("UNSPLASH_ACCESS_KEY is not set".to_string()))?;
        Self::new(&config.api_url, access_key, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so ids can never escape into another endpoint.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("API URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, String)]) -> Result<T> {
        let url = self.url(segments)?;
        let path = url.path().to_string();
        debug!(url = %url, ?query, "provider request");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read response from {}: {}", path, e)))?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        serde_json::from_slice(&body)
            .map_err(|e| Error::Serialization(format!("Unexpected response from {}: {}", path, e)))
    }
}

#[async_trait]
impl PhotoProvider for UnsplashClient {
    async fn search_photos(&self, query: &str, page: u32, per_page: u32) -> Result<SearchResponse> {
        self.get_json(
            &["search", "photos"],
            &[
                ("query", query.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ],
        )
        .await
    }

    async fn random_photos(&self, count: u32) -> Result<Vec<Photo>> {
        self.get_json(&["photos", "random"], &[("count", count.to_string())])
            .await
    }

    async fn photo_by_id(&self, id: &str) -> Result<Photo> {
        self.get_json(&["photos", id], &[]).await
    }
}

fn auth_headers(access_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut authorization = HeaderValue::from_str(&format!("Client-ID {}", access_key))
        .map_err(|_| Error::Config("UNSPLASH_ACCESS_KEY contains invalid characters".to_string()))?;
    authorization.set_sensitive(true);
    headers.insert(reqwest::header::AUTHORIZATION, authorization);
    headers.insert("accept-version", HeaderValue::from_static(API_VERSION));
    Ok(headers)
}

fn status_error(status: StatusCode, body: &[u8]) -> Error {
    if status == StatusCode::NOT_FOUND {
        return Error::NotFound;
    }
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .filter(|body| !body.errors.is_empty())
        .map(|body| body.errors.join("; "))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    Error::HttpStatus {
        status: status.as_u16(),
        message,
    }
}
