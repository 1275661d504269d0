mod http;
pub mod ops;

use std::sync::Arc;

use crate::container_specs::Image;
use crate::error::RetagError;

pub use self::http::http_cli::Credentials;

/// Name of a repository within the registry, what a mount's `from` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryName(pub String);

impl std::fmt::Display for RegistryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait::async_trait]
pub trait RegistryCore {
    fn registry_name(&self) -> RegistryName;

    async fn fetch_manifest(&self, tag: &str) -> Result<Image, RetagError>;

    /// Publishes the manifest bytes of `image` as they were fetched.
    async fn upload_manifest(&self, image: &Image, tag: &str) -> Result<(), RetagError>;
}

#[async_trait::async_trait]
pub trait BlobStore {
    /// `true` on 200, `false` on 404, an error for anything else.
    async fn blob_exists(&self, digest: &str) -> Result<bool, RetagError>;
}

#[async_trait::async_trait]
pub trait CopyOperations {
    /// Cross repository mount of `digest` from `source_registry_name`.
    async fn try_copy_from(
        &self,
        source_registry_name: &RegistryName,
        digest: &str,
    ) -> Result<(), RetagError>;
}

pub trait Registry: RegistryCore + BlobStore + CopyOperations + Send + Sync {}

impl<T> Registry for T where T: RegistryCore + BlobStore + CopyOperations + Send + Sync {}

/// Handles on both repositories of a retag. They sit on the same registry and
/// share one http client and token.
pub struct RegistryPair {
    pub source: Arc<dyn Registry>,
    pub destination: Arc<dyn Registry>,
}

/// Probe `scheme://registry_host/v2/`, negotiate a token if the registry asks
/// for one, and hand back clients for both repositories.
pub async fn connect(
    scheme: &str,
    registry_host: &str,
    source_repository: &str,
    destination_repository: &str,
    credentials: Option<&Credentials>,
) -> Result<RegistryPair, RetagError> {
    let base = format!("{}://{}/", scheme, registry_host);
    let registry_uri = base
        .parse::<::http::Uri>()
        .map_err(|e| RetagError::RegistryUnreachable {
            uri: base.clone(),
            source: e.into(),
        })?;
    tracing::debug!("Base url : {}", registry_uri);

    let http_cli = http::http_cli::HttpCli::new(registry_uri);
    let token = http::http_cli::negotiate(
        &http_cli,
        credentials,
        source_repository,
        destination_repository,
    )
    .await?;
    let http_cli = Arc::new(http_cli.with_token(token));

    Ok(RegistryPair {
        source: Arc::new(http::HttpRegistry::new(
            Arc::clone(&http_cli),
            source_repository,
        )),
        destination: Arc::new(http::HttpRegistry::new(http_cli, destination_repository)),
    })
}
