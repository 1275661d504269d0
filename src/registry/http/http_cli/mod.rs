mod authentication_flow;
mod challenge;
mod private_impl;

use anyhow::{bail, Context};

use bytes::Bytes;
use http::{Method, Response, StatusCode, Uri};

use hyper::{Body, Client};
use hyper_rustls::ConfigBuilderExt;

use crate::error::RetagError;

pub use self::authentication_flow::{negotiate, Credentials};
pub use self::challenge::BearerConfig;
use self::private_impl::{run_single_request, same_origin, with_bearer, RequestFailType};

pub(crate) type InnerClient = Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

const MAX_REDIRECTS: usize = 10;

// https://raw.githubusercontent.com/google/go-containerregistry/main/images/credhelper-basic.svg
pub struct HttpCli {
    inner_client: InnerClient,
    registry_uri: Uri,
    token: Option<String>,
}

impl HttpCli {
    /// A client talking to the registry rooted at `registry_uri`
    /// (`scheme://host[:port]/`). Plain http is only used when the uri
    /// says so.
    pub fn new(registry_uri: Uri) -> HttpCli {
        let tls = rustls::ClientConfig::builder().with_safe_defaults();
        let tls = if registry_uri.scheme() == Some(&http::uri::Scheme::HTTPS) {
            tls.with_native_roots().with_no_client_auth()
        } else {
            // Never used for a plaintext registry, skip loading the platform roots.
            tls.with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth()
        };

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();

        HttpCli {
            inner_client: Client::builder().build::<_, hyper::Body>(https),
            registry_uri,
            token: None,
        }
    }

    pub fn with_token(self, token: Option<String>) -> HttpCli {
        HttpCli { token, ..self }
    }

    pub fn registry_uri(&self) -> &Uri {
        &self.registry_uri
    }

    pub fn v2_from_path<S: AsRef<str>>(&self, path: S) -> Result<Uri, anyhow::Error> {
        let mut uri_builder = self.registry_uri.clone().into_parts();
        let path_ext = path.as_ref();
        if !path_ext.is_empty() && !path_ext.starts_with('/') {
            bail!("Invalid path reference, should start in a /")
        }
        uri_builder.path_and_query = Some(
            format!("/v2{}", path_ext)
                .try_into()
                .with_context(|| format!("Invalid registry path {:?}", path_ext))?,
        );

        let query_uri = Uri::from_parts(uri_builder)?;
        Ok(query_uri)
    }

    /// Unauthenticated `GET /v2/`. Anything but a 200 means we will have to
    /// authenticate.
    pub async fn probe(&self) -> Result<bool, RetagError> {
        let response = self.unauthenticated_base_request().await?;
        tracing::debug!("Registry response : {:?}", response);
        Ok(response.status() != StatusCode::OK)
    }

    /// Issue `GET /v2/` again to read the authentication challenge.
    pub async fn challenge(&self) -> Result<BearerConfig, RetagError> {
        let response = self.unauthenticated_base_request().await?;
        let auth_header = match response.headers().get(http::header::WWW_AUTHENTICATE) {
            Some(value) => value
                .to_str()
                .map_err(|e| RetagError::AuthChallengeParse {
                    header: format!("{:?}", value),
                    reason: e.to_string(),
                })?
                .to_string(),
            None => {
                return Err(RetagError::AuthChallengeParse {
                    header: String::new(),
                    reason: format!(
                        "registry answered {} without a WWW-Authenticate header",
                        response.status()
                    ),
                })
            }
        };
        tracing::debug!("Www-Authenticate : {}", auth_header);
        BearerConfig::from_auth_header(&auth_header)
    }

    /// `GET /v2/` without credentials. Redirects are followed the same way
    /// as for any other GET.
    async fn unauthenticated_base_request(&self) -> Result<Response<Body>, RetagError> {
        let unreachable = |source: anyhow::Error| RetagError::RegistryUnreachable {
            uri: self.registry_uri.to_string(),
            source,
        };
        let uri = self.v2_from_path("/").map_err(unreachable)?;
        self.send(&uri, Method::GET, None, |c| c, Bytes::new())
            .await
            .map_err(unreachable)
    }

    pub async fn request_simple(
        &self,
        uri: &Uri,
        method: Method,
    ) -> Result<Response<Body>, anyhow::Error> {
        self.request(uri, method, |c| c, Bytes::new()).await
    }

    /// One attempt at `method uri`, carrying the bearer token if we hold one.
    pub async fn request<F>(
        &self,
        uri: &Uri,
        method: Method,
        configure_request: F,
        body: Bytes,
    ) -> Result<Response<Body>, anyhow::Error>
    where
        F: Fn(http::request::Builder) -> http::request::Builder + Send + Sync,
    {
        self.send(uri, method, self.token.as_deref(), configure_request, body)
            .await
    }

    /// GET and HEAD follow redirects, the token is only sent along while we
    /// stay on the registry's scheme, host and port.
    async fn send<F>(
        &self,
        uri: &Uri,
        method: Method,
        token: Option<&str>,
        configure_request: F,
        body: Bytes,
    ) -> Result<Response<Body>, anyhow::Error>
    where
        F: Fn(http::request::Builder) -> http::request::Builder + Send + Sync,
    {
        let mut uri = uri.clone();
        let mut hops = 0;
        loop {
            let hop_token = if same_origin(&uri, &self.registry_uri) {
                token
            } else {
                None
            };
            let req_builder = http::request::Builder::default()
                .method(method.clone())
                .uri(uri.clone());
            let request = configure_request(with_bearer(req_builder, hop_token))
                .body(Body::from(body.clone()))
                .with_context(|| format!("Failed to build {} request for {}", method, uri))?;

            match run_single_request(&self.inner_client, request).await {
                Ok(r) => return Ok(r),
                Err(RequestFailType::Redirection(location)) => {
                    hops += 1;
                    if hops > MAX_REDIRECTS {
                        bail!("Too many redirects issuing {} {}", method, uri);
                    }
                    tracing::debug!("Redirected from {} to {}", uri, location);
                    uri = location;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Issuing {} request to {}", method, uri))
                }
            }
        }
    }
}
