use anyhow::Context;
use http::request::Builder;
use http::{Method, Response, Uri};

use hyper::Body;

use super::InnerClient;

/// Attach `Authorization: Bearer <token>`, but only for a non empty token.
pub(super) fn with_bearer(builder: Builder, token: Option<&str>) -> Builder {
    match token {
        Some(token) if !token.is_empty() => {
            builder.header(http::header::AUTHORIZATION, format!("Bearer {}", token))
        }
        _ => builder,
    }
}

/// Only safe methods are transparently redirected, a redirected POST or PUT
/// would need its body replayed.
pub(super) fn follows_redirects(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Scheme, host and port all match. Credentials never leave that origin.
pub(super) fn same_origin(a: &Uri, b: &Uri) -> bool {
    a.scheme() == b.scheme() && a.authority() == b.authority()
}

/// Location headers are allowed to be relative, in which case they resolve
/// against the uri we just hit.
pub(super) fn resolve_location(current: &Uri, location: &str) -> anyhow::Result<Uri> {
    let location_uri = location
        .parse::<Uri>()
        .with_context(|| format!("Unable to parse redirection location {:?}", location))?;
    if location_uri.host().is_some() {
        return Ok(location_uri);
    }
    let mut parts = current.clone().into_parts();
    parts.path_and_query = location_uri.path_and_query().cloned();
    Uri::from_parts(parts).with_context(|| {
        format!(
            "Constructed an invalid uri from parts, new uri: {:?}",
            location_uri
        )
    })
}

#[derive(thiserror::Error, Debug)]
pub enum RequestFailType {
    #[error("Failed to connect: '{0}'")]
    ConnectError(hyper::Error),
    #[error("Generic hyper error: '{0}'")]
    HyperError(hyper::Error),
    #[error("Got a redirection to: '{0}'")]
    Redirection(Uri),
    #[error("Internal error: '{0:?}'")]
    AnyhowError(anyhow::Error),
}

impl From<anyhow::Error> for RequestFailType {
    fn from(e: anyhow::Error) -> Self {
        RequestFailType::AnyhowError(e)
    }
}

/// Issue exactly one request. A redirect is reported back rather than
/// followed so the caller can decide what credentials travel with it.
pub(super) async fn run_single_request(
    inner_client: &InnerClient,
    request: http::Request<Body>,
) -> Result<Response<Body>, RequestFailType> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let r = match inner_client.request(request).await {
        Err(e) => {
            if e.is_connect() {
                return Err(RequestFailType::ConnectError(e));
            } else {
                return Err(RequestFailType::HyperError(e));
            }
        }
        Ok(r) => r,
    };
    tracing::debug!("{} {} -> {}", method, uri, r.status());

    if r.status().is_redirection() && follows_redirects(&method) {
        if let Some(location_header) = r.headers().get(http::header::LOCATION) {
            let location_str = location_header.to_str().with_context(|| {
                format!("Unable to parse redirection header {:?}", location_header)
            })?;
            return Err(RequestFailType::Redirection(resolve_location(
                &uri,
                location_str,
            )?));
        }
    }
    Ok(r)
}
