//! Shared fixtures: mock v2 registries and a mock directory service served
//! over local TCP.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::extract::{Path as AxumPath, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use boxcar_image::{Config, RegistryConfig, Settings, TagTransform};

/// Bearer token handed out by the mock token endpoint.
pub const TEST_TOKEN: &str = "test-token";

/// Binds a local listener, hands its base URL to the router builder, and
/// serves the result in the background.
pub async fn spawn_with<F>(build: F) -> String
where
    F: FnOnce(&str) -> Router,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(&base);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

/// Spawns a router that does not need to know its own address.
pub async fn spawn(router: Router) -> String {
    spawn_with(move |_| router).await
}

/// In-memory contents of a mock registry for a single repository.
#[derive(Debug, Default)]
pub struct RegistryFixture {
    /// Manifests keyed by tag or digest.
    pub manifests: HashMap<String, serde_json::Value>,
    /// Blobs keyed by digest.
    pub blobs: HashMap<String, Vec<u8>>,
    /// When true, `/v2/` answers 401 and manifests/blobs require the bearer
    /// token from the mock token endpoint.
    pub require_token: bool,
}

impl RegistryFixture {
    pub fn with_manifest(mut self, reference: &str, manifest: serde_json::Value) -> Self {
        self.manifests.insert(reference.to_string(), manifest);
        self
    }

    pub fn with_blob(mut self, digest: &str, content: Vec<u8>) -> Self {
        self.blobs.insert(digest.to_string(), content);
        self
    }

    pub fn with_token_auth(mut self) -> Self {
        self.require_token = true;
        self
    }
}

fn authorized(fixture: &RegistryFixture, headers: &HeaderMap) -> bool {
    if !fixture.require_token {
        return true;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TEST_TOKEN}"))
        .unwrap_or(false)
}

/// Builds a mock distribution-v2 router serving `repo` from the fixture.
/// `base` is the server's own base URL, used for the challenge realm.
pub fn registry_router(repo: &str, fixture: RegistryFixture, base: &str) -> Router {
    let state = Arc::new(fixture);
    let realm = format!("{base}/token");

    let v2 = {
        let state = Arc::clone(&state);
        move || {
            let state = Arc::clone(&state);
            let realm = realm.clone();
            async move {
                if state.require_token {
                    (
                        StatusCode::UNAUTHORIZED,
                        [(
                            header::WWW_AUTHENTICATE,
                            format!(r#"Bearer realm="{realm}",service="registry.test""#),
                        )],
                    )
                        .into_response()
                } else {
                    StatusCode::OK.into_response()
                }
            }
        }
    };

    let token = move || async move { Json(json!({ "token": TEST_TOKEN })) };

    let manifests = {
        let state = Arc::clone(&state);
        move |AxumPath(reference): AxumPath<String>, headers: HeaderMap| {
            let state = Arc::clone(&state);
            async move {
                if !authorized(&state, &headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                match state.manifests.get(&reference) {
                    Some(manifest) => Json(manifest.clone()).into_response(),
                    None => StatusCode::NOT_FOUND.into_response(),
                }
            }
        }
    };

    let blobs = {
        let state = Arc::clone(&state);
        move |AxumPath(digest): AxumPath<String>, headers: HeaderMap| {
            let state = Arc::clone(&state);
            async move {
                if !authorized(&state, &headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                match state.blobs.get(&digest) {
                    Some(content) => content.clone().into_response(),
                    None => StatusCode::NOT_FOUND.into_response(),
                }
            }
        }
    };

    Router::new()
        .route("/v2/", get(v2))
        .route("/token", get(token))
        .route(&format!("/v2/{repo}/manifests/:reference"), get(manifests))
        .route(&format!("/v2/{repo}/blobs/:digest"), get(blobs))
}

/// Builds a mock directory-service router answering every search with
/// `body`. Observed `search` parameters are appended to `seen`.
pub fn directory_router(body: serde_json::Value, seen: Arc<Mutex<Vec<String>>>) -> Router {
    let handler = move |Query(params): Query<HashMap<String, String>>| {
        let body = body.clone();
        let seen = Arc::clone(&seen);
        async move {
            if let Some(search) = params.get("search") {
                seen.lock().unwrap().push(search.clone());
            }
            Json(body)
        }
    };
    Router::new().route("/api/v1/image", get(handler))
}

/// A fake `sha256:` digest made of one repeated hex character.
pub fn digest(fill: char) -> String {
    format!("sha256:{}", fill.to_string().repeat(64))
}

/// Builds an uncompressed tar from `(path, content)` entries.
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Gzips a byte buffer.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// An image manifest JSON document.
pub fn image_manifest(config_digest: &str, layers: &[(&str, u64)]) -> serde_json::Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 2,
            "digest": config_digest
        },
        "layers": layers
            .iter()
            .map(|(digest, size)| json!({
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": size,
                "digest": digest
            }))
            .collect::<Vec<_>>()
    })
}

/// An index manifest JSON document from `(arch, digest)` entries.
pub fn index_manifest(entries: &[(&str, &str)]) -> serde_json::Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
        "manifests": entries
            .iter()
            .map(|(arch, digest)| json!({
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "size": 1,
                "digest": digest,
                "platform": {"architecture": arch, "os": "linux"}
            }))
            .collect::<Vec<_>>()
    })
}

/// A config for tests: quiet settings, no directory service, fast retries.
pub fn test_config(registries: &[(&str, &str, u32)]) -> Config {
    Config {
        registries: registries
            .iter()
            .map(|(name, host, priority)| RegistryConfig {
                name: (*name).to_string(),
                host: (*host).to_string(),
                priority: *priority,
                timeout_secs: 5,
                ..RegistryConfig::default()
            })
            .collect(),
        tag_transform: TagTransform::default(),
        settings: Settings {
            retry_count: 1,
            enable_progress_bar: false,
            enable_advanced_api: false,
            ..Settings::default()
        },
    }
}
