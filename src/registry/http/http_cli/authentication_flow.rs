use anyhow::{bail, Context};

use http::Uri;

use hyper::Body;

use serde::{Deserialize, Serialize};

use crate::error::RetagError;
use crate::registry::http::util::dump_body_to_string;

use super::private_impl::run_single_request;
use super::{BearerConfig, HttpCli, InnerClient};

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
    pub issued_at: Option<String>,
}

impl AuthResponse {
    /// `token` is what registries document, `access_token` is what OAuth2
    /// style token servers send. Empty strings count as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.access_token.as_deref().filter(|t| !t.is_empty()))
    }
}

/// Pull on the source, pull and push on the destination.
pub fn scope_for(source_repository: &str, destination_repository: &str) -> String {
    if source_repository == destination_repository {
        format!("repository:{}:pull,push", destination_repository)
    } else {
        format!(
            "repository:{}:pull repository:{}:pull,push",
            source_repository, destination_repository
        )
    }
}

/// Decide whether the registry needs a token and, if it does, fetch one.
///
/// `Ok(None)` means anonymous access works. Missing credentials on a
/// registry that wants them fail before any further request is issued.
pub async fn negotiate(
    http_cli: &HttpCli,
    credentials: Option<&Credentials>,
    source_repository: &str,
    destination_repository: &str,
) -> Result<Option<String>, RetagError> {
    if !http_cli.probe().await? {
        tracing::info!("Registry reachable");
        return Ok(None);
    }

    let credentials = credentials.ok_or_else(|| RetagError::AuthRequired {
        registry: http_cli.registry_uri().to_string(),
    })?;

    let bearer_config = http_cli.challenge().await?;
    tracing::debug!("Authentication challenge: {}", bearer_config);

    let scope = scope_for(source_repository, destination_repository);
    let auth_response = authenticate_request(
        &bearer_config,
        &scope,
        credentials,
        &http_cli.inner_client,
    )
    .await
    .map_err(|source| RetagError::TokenRequest {
        realm: bearer_config.realm.to_string(),
        source,
    })?;

    match auth_response.bearer_token() {
        Some(token) => {
            tracing::info!("Token obtained");
            Ok(Some(token.to_string()))
        }
        None => Err(RetagError::TokenRequest {
            realm: bearer_config.realm.to_string(),
            source: anyhow::anyhow!("token response did not contain a token"),
        }),
    }
}

/// `realm` with `service` and `scope` appended to whatever query it already
/// carries.
pub(super) fn token_uri(bearer_config: &BearerConfig, scope: &str) -> anyhow::Result<Uri> {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    if let Some(service) = &bearer_config.service {
        query.append_pair("service", service);
    }
    query.append_pair("scope", scope);
    let new_query_items = query.finish();

    let mut parts = bearer_config.realm.clone().into_parts();
    let new_path_q = match parts.path_and_query.as_ref() {
        Some(existing) => match existing.query() {
            Some(q) if !q.is_empty() => format!("{}?{}&{}", existing.path(), q, new_query_items),
            _ => format!("{}?{}", existing.path(), new_query_items),
        },
        None => format!("/?{}", new_query_items),
    };
    parts.path_and_query = Some(
        new_path_q
            .as_str()
            .try_into()
            .with_context(|| format!("Failed to parse path and query from {:?}", new_path_q))?,
    );
    Uri::from_parts(parts).with_context(|| {
        format!(
            "Failed to parse uri from installing new path and query of {}",
            new_path_q
        )
    })
}

pub(super) async fn authenticate_request(
    bearer_config: &BearerConfig,
    scope: &str,
    credentials: &Credentials,
    inner_client: &InnerClient,
) -> anyhow::Result<AuthResponse> {
    use base64::prelude::*;

    let new_uri = token_uri(bearer_config, scope)?;
    tracing::debug!("Requesting token query string : {}", new_uri);

    let basic_auth_info = format!("{}:{}", credentials.user, credentials.password);
    let request = http::request::Builder::default()
        .method(http::Method::GET)
        .uri(new_uri.clone())
        .header(
            http::header::AUTHORIZATION,
            format!("Basic {}", BASE64_STANDARD.encode(basic_auth_info)),
        )
        .body(Body::empty())?;

    let mut response = run_single_request(inner_client, request)
        .await
        .with_context(|| {
            format!(
                "Failed to run new request to try authenticate to {:?}",
                new_uri
            )
        })?;

    let status = response.status();
    let response_body = dump_body_to_string(&mut response)
        .await
        .unwrap_or_default();
    if !status.is_success() {
        bail!(
            "Failed to authenticate to {:?}, got status code: {:?}, body:\n{}",
            new_uri,
            status,
            response_body
        );
    }

    let response_auth_info: AuthResponse = serde_json::from_str(&response_body)
        .with_context(|| format!("Token response was not valid json:\n{}", response_body))?;
    Ok(response_auth_info)
}
