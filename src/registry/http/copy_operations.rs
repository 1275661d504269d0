use crate::error::RetagError;
use crate::registry::{CopyOperations, RegistryName};

use http::StatusCode;

use super::util::{checked_digest, unexpected_status};

#[async_trait::async_trait]
impl CopyOperations for super::HttpRegistry {
    async fn try_copy_from(
        &self,
        source_registry_name: &RegistryName,
        digest: &str,
    ) -> Result<(), RetagError> {
        let mount_error = |source: anyhow::Error| RetagError::BlobMount {
            digest: digest.to_string(),
            repository: self.name.clone(),
            from: source_registry_name.to_string(),
            source,
        };

        let digest = checked_digest(digest).map_err(mount_error)?;
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("from", &source_registry_name.0)
            .append_pair("mount", digest)
            .finish();
        let uri = self
            .repository_uri_from_path(format!("/blobs/uploads/?{}", query))
            .map_err(mount_error)?;
        tracing::debug!("Mounting layer query string : {}", uri);

        let mut r = self
            .http_client
            .request_simple(&uri, http::Method::POST)
            .await
            .map_err(mount_error)?;

        if r.status() == StatusCode::CREATED {
            Ok(())
        } else {
            Err(mount_error(
                unexpected_status(&mut r, StatusCode::CREATED).await,
            ))
        }
    }
}
