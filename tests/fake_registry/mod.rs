//! A small in-process registry speaking just enough of the v2 API for a
//! retag: base probe, token endpoint, manifests, blob HEAD and mounts. Every
//! request is recorded so tests can assert on the exact exchange.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use base64::prelude::*;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Server};
use sha2::Digest;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub user: String,
    pub password: String,
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Default)]
pub struct State {
    pub auth: Option<AuthConfig>,
    pub manifests: HashMap<(String, String), Bytes>,
    pub blobs: HashMap<String, HashSet<String>>,
    pub head_override: HashMap<String, StatusCode>,
    pub mount_override: HashMap<String, StatusCode>,
    pub put_status: Option<StatusCode>,
    /// Fixed answers by path, checked before anything else, query ignored.
    pub routes: HashMap<String, (StatusCode, Option<String>)>,
    pub requests: Vec<RecordedRequest>,
}

impl State {
    pub fn with_manifest(mut self, repository: &str, tag: &str, manifest: &str) -> State {
        self.manifests.insert(
            (repository.to_string(), tag.to_string()),
            Bytes::copy_from_slice(manifest.as_bytes()),
        );
        self
    }

    pub fn with_blobs(mut self, repository: &str, digests: &[&str]) -> State {
        self.blobs
            .entry(repository.to_string())
            .or_default()
            .extend(digests.iter().map(|e| e.to_string()));
        self
    }

    pub fn with_route(mut self, path: &str, status: StatusCode, location: Option<&str>) -> State {
        self.routes.insert(
            path.to_string(),
            (status, location.map(|e| e.to_string())),
        );
        self
    }

    pub fn with_auth(mut self, user: &str, password: &str, token: &str) -> State {
        self.auth = Some(AuthConfig {
            user: user.to_string(),
            password: password.to_string(),
            token: token.to_string(),
        });
        self
    }
}

pub struct FakeRegistry {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<State>>,
}

impl FakeRegistry {
    pub async fn start(state: State) -> FakeRegistry {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind fake registry");
        listener
            .set_nonblocking(true)
            .expect("set listener non blocking");
        let addr = listener.local_addr().expect("listener address");
        let state = Arc::new(Mutex::new(state));

        let svc_state = Arc::clone(&state);
        let make_svc = make_service_fn(move |_conn| {
            let state = Arc::clone(&svc_state);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle(Arc::clone(&state), addr, req)
                }))
            }
        });
        let server = Server::from_tcp(listener)
            .expect("fake registry server")
            .serve(make_svc);
        tokio::spawn(server);

        FakeRegistry { addr, state }
    }

    pub fn reference(&self, repository_and_tag: &str) -> String {
        format!("{}/{}", self.addr, repository_and_tag)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_matching(&self, method: Method, path_suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.ends_with(path_suffix))
            .collect()
    }

    pub fn manifest(&self, repository: &str, tag: &str) -> Option<Bytes> {
        self.state
            .lock()
            .unwrap()
            .manifests
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
    }
}

fn header(parts: &http::request::Parts, name: http::header::HeaderName) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn respond(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("docker-distribution-api-version", "registry/2.0")
        .body(Body::empty())
        .unwrap()
}

fn digest_of(data: &[u8]) -> String {
    format!("sha256:{:x}", sha2::Sha256::digest(data))
}

async fn handle(
    state: Arc<Mutex<State>>,
    addr: SocketAddr,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = hyper::body::to_bytes(body).await.unwrap_or_default();
    let query: HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        method: parts.method.clone(),
        path: parts.uri.path().to_string(),
        query: query.clone(),
        authorization: header(&parts, http::header::AUTHORIZATION),
        accept: header(&parts, http::header::ACCEPT),
        content_type: header(&parts, http::header::CONTENT_TYPE),
        body: body.clone(),
    });

    let path = parts.uri.path().to_string();
    let authorization = header(&parts, http::header::AUTHORIZATION);

    if let Some((status, location)) = state.routes.get(&path) {
        let mut response = Response::builder().status(*status);
        if let Some(location) = location {
            response = response.header(http::header::LOCATION, location.as_str());
        }
        return Ok(response.body(Body::empty()).unwrap());
    }

    if path == "/token" {
        return Ok(token_response(&state, authorization.as_deref()));
    }

    if let Some(auth) = &state.auth {
        if authorization.as_deref() != Some(format!("Bearer {}", auth.token).as_str()) {
            let challenge = format!(
                r#"Bearer realm="http://{}/token",service="fake-registry""#,
                addr
            );
            return Ok(Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header(http::header::WWW_AUTHENTICATE, challenge)
                .body(Body::empty())
                .unwrap());
        }
    }

    if path == "/v2/" {
        return Ok(respond(StatusCode::OK));
    }

    let rest = match path.strip_prefix("/v2/") {
        Some(rest) => rest,
        None => return Ok(respond(StatusCode::NOT_FOUND)),
    };

    if let Some(repository) = rest.strip_suffix("/blobs/uploads/") {
        if parts.method != Method::POST {
            return Ok(respond(StatusCode::METHOD_NOT_ALLOWED));
        }
        let (from, mount) = match (query.get("from"), query.get("mount")) {
            (Some(from), Some(mount)) => (from.clone(), mount.clone()),
            _ => return Ok(respond(StatusCode::ACCEPTED)),
        };
        if let Some(status) = state.mount_override.get(&mount) {
            return Ok(respond(*status));
        }
        let in_source = state
            .blobs
            .get(&from)
            .map(|b| b.contains(&mount))
            .unwrap_or(false);
        if !in_source {
            // A registry falls back to starting a regular upload.
            return Ok(respond(StatusCode::ACCEPTED));
        }
        state
            .blobs
            .entry(repository.to_string())
            .or_default()
            .insert(mount.clone());
        return Ok(Response::builder()
            .status(StatusCode::CREATED)
            .header(
                http::header::LOCATION,
                format!("/v2/{}/blobs/{}", repository, mount),
            )
            .body(Body::empty())
            .unwrap());
    }

    if let Some((repository, digest)) = rest.rsplit_once("/blobs/") {
        if parts.method != Method::HEAD {
            return Ok(respond(StatusCode::METHOD_NOT_ALLOWED));
        }
        if let Some(status) = state.head_override.get(digest) {
            return Ok(respond(*status));
        }
        let present = state
            .blobs
            .get(repository)
            .map(|b| b.contains(digest))
            .unwrap_or(false);
        return Ok(respond(if present {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        }));
    }

    if let Some((repository, tag)) = rest.rsplit_once("/manifests/") {
        let key = (repository.to_string(), tag.to_string());
        if parts.method == Method::GET {
            return Ok(match state.manifests.get(&key) {
                Some(manifest) => Response::builder()
                    .status(StatusCode::OK)
                    .header(http::header::CONTENT_TYPE, DOCKER_MANIFEST_V2)
                    .header("docker-content-digest", digest_of(manifest))
                    .body(Body::from(manifest.clone()))
                    .unwrap(),
                None => respond(StatusCode::NOT_FOUND),
            });
        }
        if parts.method == Method::PUT {
            if let Some(status) = state.put_status {
                return Ok(respond(status));
            }
            let digest = digest_of(&body);
            state.manifests.insert(key, body);
            return Ok(Response::builder()
                .status(StatusCode::CREATED)
                .header("docker-content-digest", digest.clone())
                .header(
                    http::header::LOCATION,
                    format!("/v2/{}/manifests/{}", repository, digest),
                )
                .body(Body::empty())
                .unwrap());
        }
        return Ok(respond(StatusCode::METHOD_NOT_ALLOWED));
    }

    Ok(respond(StatusCode::NOT_FOUND))
}

fn token_response(state: &State, authorization: Option<&str>) -> Response<Body> {
    let auth = match &state.auth {
        Some(auth) => auth,
        None => return respond(StatusCode::NOT_FOUND),
    };
    let expected = format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{}:{}", auth.user, auth.password))
    );
    if authorization != Some(expected.as_str()) {
        return respond(StatusCode::UNAUTHORIZED);
    }
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!(
            r#"{{"token": "{}", "expires_in": 300}}"#,
            auth.token
        )))
        .unwrap()
}
