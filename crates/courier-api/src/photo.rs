use bytes::Bytes;
use courier_core::{CoreError, ResourceCache, ResourceFetcher};

use crate::client::ApiClient;

/// A contact photo as served by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub url: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Contact photos keyed by handle.
pub type PhotoCache = ResourceCache<String, Photo, ApiClient>;

impl ResourceFetcher<String, Photo> for ApiClient {
    async fn fetch(&self, handle: &String) -> Result<Option<Photo>, CoreError> {
        Ok(self.fetch_photo(handle).await?)
    }
}
