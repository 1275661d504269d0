use anyhow::{bail, Context, Error};
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};

use hyper::Body;
use regex::Regex;

use crate::error::UnexpectedStatus;

pub(super) async fn dump_body_to_bytes(response: &mut Response<Body>) -> Result<Bytes, Error> {
    hyper::body::to_bytes(response.body_mut())
        .await
        .context("Reading response body")
}

pub(super) async fn dump_body_to_string(response: &mut Response<Body>) -> Result<String, Error> {
    let buffer = dump_body_to_bytes(response).await?;
    let metadata = std::str::from_utf8(&buffer)?;
    Ok(metadata.to_string())
}

/// Build the error for a response that did not carry the status we need,
/// keeping whatever body the registry sent for the diagnostic.
pub(super) async fn unexpected_status(
    response: &mut Response<Body>,
    expected: StatusCode,
) -> Error {
    let actual = response.status();
    let body = match dump_body_to_bytes(response).await {
        Ok(b) => String::from_utf8_lossy(&b).into_owned(),
        Err(_) => String::new(),
    };
    UnexpectedStatus::new(expected.to_string(), actual, body).into()
}

pub(super) fn docker_content_digest(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("docker-content-digest")
        .and_then(|e| e.to_str().ok())
}

/// `algorithm:encoded` as content addressable digests are written, anything
/// else must not end up in a request path.
pub(super) fn checked_digest(digest: &str) -> Result<&str, Error> {
    let digest_regex = Regex::new(r"^[a-z0-9]+(?:[+._-][a-z0-9]+)*:[a-zA-Z0-9=_-]+$")?;
    if !digest_regex.is_match(digest) {
        bail!("Invalid blob digest {:?}", digest)
    }
    Ok(digest)
}
