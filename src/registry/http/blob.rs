use crate::error::RetagError;
use crate::registry::BlobStore;

use http::StatusCode;

use super::util::{checked_digest, unexpected_status};

#[async_trait::async_trait]
impl BlobStore for super::HttpRegistry {
    async fn blob_exists(&self, digest: &str) -> Result<bool, RetagError> {
        let check_error = |source: anyhow::Error| RetagError::BlobCheck {
            digest: digest.to_string(),
            repository: self.name.clone(),
            source,
        };

        let digest = checked_digest(digest).map_err(check_error)?;
        let uri = self
            .repository_uri_from_path(format!("/blobs/{}", digest))
            .map_err(check_error)?;

        let mut r = self
            .http_client
            .request_simple(&uri, http::Method::HEAD)
            .await
            .map_err(check_error)?;

        match r.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(check_error(
                unexpected_status(&mut r, StatusCode::OK).await,
            )),
        }
    }
}
