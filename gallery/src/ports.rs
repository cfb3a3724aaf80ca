#![deny(clippy::all)]

use crate::domain::{Photo, SearchResponse};
use async_trait::async_trait;
use shared::Result;

// Ports are the pluggable extension points for the photo service and durable storage

/// Port for the remote photo service (e.g., Unsplash)
#[async_trait]
pub trait PhotoProvider: Send + Sync + 'static {
    async fn search_photos(&self, query: &str, page: u32, per_page: u32)
    -> Result<SearchResponse>;
    async fn random_photos(&self, count: u32) -> Result<Vec<Photo>>;
    async fn photo_by_id(&self, id: &str) -> Result<Photo>;
}

/// Port for durable client-side storage holding serialized snapshots.
/// Implementations are synchronous; callers treat every failure as best-effort.
pub trait SnapshotStorage: Send + Sync + 'static {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}
