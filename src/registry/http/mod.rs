mod blob;
mod copy_operations;
pub(super) mod http_cli;
mod util;

use std::sync::Arc;

use crate::container_specs::manifest::DOCKER_MANIFEST_V2;
use crate::container_specs::Image;
use crate::error::RetagError;
use crate::registry::RegistryName;

use anyhow::{bail, Error};
use http::{StatusCode, Uri};

use self::http_cli::HttpCli;
use self::util::{docker_content_digest, dump_body_to_bytes, unexpected_status};

pub struct HttpRegistry {
    name: String,
    http_client: Arc<HttpCli>,
}

#[async_trait::async_trait]
impl super::RegistryCore for HttpRegistry {
    fn registry_name(&self) -> RegistryName {
        RegistryName(self.name.clone())
    }

    async fn fetch_manifest(&self, tag: &str) -> Result<Image, RetagError> {
        let reference = format!("{}:{}", self.name, tag);
        let fetch_error = |source: Error| RetagError::ManifestFetch {
            reference: reference.clone(),
            source,
        };

        let uri = self
            .repository_uri_from_path(format!("/manifests/{}", tag))
            .map_err(fetch_error)?;
        tracing::debug!("Getting manifest at URL : {}", uri);

        let mut r = self
            .http_client
            .request(
                &uri,
                http::Method::GET,
                |req| req.header(http::header::ACCEPT, DOCKER_MANIFEST_V2),
                Default::default(),
            )
            .await
            .map_err(fetch_error)?;

        if r.status() != StatusCode::OK {
            return Err(fetch_error(unexpected_status(&mut r, StatusCode::OK).await));
        }

        let served_digest = docker_content_digest(r.headers()).map(|e| e.to_string());
        let raw = dump_body_to_bytes(&mut r).await.map_err(fetch_error)?;
        let image =
            Image::from_manifest_bytes(raw).map_err(|source| RetagError::ManifestDecode {
                reference: reference.clone(),
                source,
            })?;

        if let Some(served_digest) = served_digest {
            if served_digest != image.digest() {
                tracing::warn!(
                    "Registry says manifest {} has digest {}, but the bytes we got hash to {}",
                    reference,
                    served_digest,
                    image.digest()
                );
            }
        }
        if let Some(media_type) = image.manifest.media_type.as_deref() {
            if media_type != DOCKER_MANIFEST_V2 {
                tracing::warn!(
                    "Manifest {} has media type {}, it will be published as {}",
                    reference,
                    media_type,
                    DOCKER_MANIFEST_V2
                );
            }
        }
        tracing::debug!("Decoded manifest : {:?}", image.manifest);
        Ok(image)
    }

    async fn upload_manifest(&self, image: &Image, tag: &str) -> Result<(), RetagError> {
        let reference = format!("{}:{}", self.name, tag);
        let publish_error = |source: Error| RetagError::ManifestPublish {
            reference: reference.clone(),
            source,
        };

        let put_target_uri = self
            .repository_uri_from_path(format!("/manifests/{}", tag))
            .map_err(publish_error)?;
        let mut r = self
            .http_client
            .request(
                &put_target_uri,
                http::Method::PUT,
                |req| req.header(http::header::CONTENT_TYPE, DOCKER_MANIFEST_V2),
                image.raw_manifest().clone(),
            )
            .await
            .map_err(publish_error)?;

        if r.status() != StatusCode::CREATED {
            return Err(publish_error(
                unexpected_status(&mut r, StatusCode::CREATED).await,
            ));
        }

        if let Some(published_digest) = docker_content_digest(r.headers()) {
            if published_digest != image.digest() {
                tracing::warn!(
                    "Published manifest {} got digest {}, the source manifest was {}",
                    reference,
                    published_digest,
                    image.digest()
                );
            }
        }
        match r.headers().get(http::header::LOCATION) {
            Some(location) => tracing::debug!(
                "Uploaded manifest to repository {} for tag: {} @ {:?}",
                self.name,
                tag,
                location
            ),
            None => tracing::debug!(
                "Uploaded manifest to repository {} for tag: {}",
                self.name,
                tag
            ),
        }
        Ok(())
    }
}

impl HttpRegistry {
    pub(super) fn new<S: AsRef<str>>(http_client: Arc<HttpCli>, name: S) -> HttpRegistry {
        HttpRegistry {
            name: name.as_ref().to_string(),
            http_client,
        }
    }

    fn repository_uri_from_path<S: AsRef<str>>(&self, path: S) -> Result<Uri, Error> {
        let path_ext = path.as_ref();
        if !path_ext.starts_with('/') {
            bail!("Invalid path reference, should start in a /")
        }
        self.http_client
            .v2_from_path(format!("/{}{}", self.name, path_ext))
    }
}
