//! Registry v2 protocol client: token handshake and manifest retrieval.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{ImageError, Result};
use crate::http::base_url;
use crate::manifest::{Manifest, MEDIA_TYPE_MANIFEST_V2};

/// Deadline for protocol requests (token, manifest). Blob downloads carry
/// their own deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Optional basic-auth credentials forwarded to token endpoints.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    /// No credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Username/password pair.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    fn pair(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

/// Obtains a bearer token for pulling `repository` from `registry`.
///
/// `GET /v2/` decides whether authentication is needed at all: a 200 means
/// the registry is open and an empty token is returned. Any other status
/// triggers the challenge flow: the `WWW-Authenticate` header names a realm
/// and service, and the token endpoint is queried with a pull scope,
/// carrying a basic credential when one is configured.
///
/// # Errors
///
/// Returns [`ImageError::AuthFailure`] when the challenge header is missing
/// or malformed, the token endpoint answers non-200, or its body cannot be
/// parsed.
pub async fn fetch_token(
    client: &Client,
    registry: &RegistryConfig,
    repository: &str,
    credentials: &Credentials,
) -> Result<String> {
    let url = format!("{}/v2/", base_url(&registry.host));
    let response = client
        .get(&url)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| ImageError::AuthFailure(format!("challenge request failed: {e}")))?;

    if response.status() == StatusCode::OK {
        return Ok(String::new());
    }

    let header = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ImageError::AuthFailure("missing WWW-Authenticate header".to_string()))?;
    let (realm, service) = parse_challenge(header)?;

    let token_url = format!("{realm}?service={service}&scope=repository:{repository}:pull");
    debug!(url = %token_url, "requesting bearer token");

    let mut request = client.get(&token_url).timeout(REQUEST_TIMEOUT);
    if let Some((username, password)) = credentials.pair() {
        request = request.basic_auth(username, Some(password));
    }

    let response = request
        .send()
        .await
        .map_err(|e| ImageError::AuthFailure(format!("token request failed: {e}")))?;
    if response.status() != StatusCode::OK {
        return Err(ImageError::AuthFailure(format!(
            "token endpoint returned status {}",
            response.status().as_u16()
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ImageError::AuthFailure(format!("unparseable token response: {e}")))?;

    if token.token.is_empty() {
        Ok(token.access_token)
    } else {
        Ok(token.token)
    }
}

/// Extracts realm and service from a `WWW-Authenticate` challenge. The realm
/// is the first quoted field, the service the second.
fn parse_challenge(header: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = header.split('"').collect();
    if parts.len() < 4 {
        return Err(ImageError::AuthFailure(format!(
            "malformed WWW-Authenticate header: {header}"
        )));
    }
    Ok((parts[1].to_string(), parts[3].to_string()))
}

/// Fetches a manifest by tag or digest.
///
/// # Errors
///
/// Returns [`ImageError::ManifestUnavailable`] on any non-200 response.
pub async fn fetch_manifest(
    client: &Client,
    registry: &RegistryConfig,
    repository: &str,
    reference: &str,
    token: &str,
) -> Result<Manifest> {
    let url = format!(
        "{}/v2/{}/manifests/{}",
        base_url(&registry.host),
        repository,
        reference
    );
    debug!(url = %url, "fetching manifest");

    let mut request = client
        .get(&url)
        .timeout(REQUEST_TIMEOUT)
        .header(header::ACCEPT, MEDIA_TYPE_MANIFEST_V2);
    if !token.is_empty() {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = request.send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(ImageError::ManifestUnavailable {
            status: status.as_u16(),
        });
    }

    Ok(response.json().await?)
}

/// Composes the blob URL for `digest` in `repository`.
#[must_use]
pub fn blob_url(registry: &RegistryConfig, repository: &str, digest: &str) -> String {
    format!(
        "{}/v2/{}/blobs/{}",
        base_url(&registry.host),
        repository,
        digest
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge() {
        let (realm, service) = parse_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#,
        )
        .unwrap();
        assert_eq!(realm, "https://auth.docker.io/token");
        assert_eq!(service, "registry.docker.io");
    }

    #[test]
    fn test_parse_challenge_with_scope() {
        let (realm, service) = parse_challenge(
            r#"Bearer realm="https://auth.example.com/t",service="svc",scope="repository:x:pull""#,
        )
        .unwrap();
        assert_eq!(realm, "https://auth.example.com/t");
        assert_eq!(service, "svc");
    }

    #[test]
    fn test_parse_challenge_malformed() {
        assert!(matches!(
            parse_challenge("Bearer realm=unquoted"),
            Err(ImageError::AuthFailure(_))
        ));
        assert!(matches!(
            parse_challenge(r#"Bearer realm="only-one""#),
            Err(ImageError::AuthFailure(_))
        ));
    }

    #[test]
    fn test_blob_url() {
        let registry = RegistryConfig {
            host: "mirror.example.com".to_string(),
            ..RegistryConfig::default()
        };
        assert_eq!(
            blob_url(&registry, "library/alpine", "sha256:abcd"),
            "https://mirror.example.com/v2/library/alpine/blobs/sha256:abcd"
        );
    }

    #[test]
    fn test_credentials_pair() {
        assert!(Credentials::anonymous().pair().is_none());
        let creds = Credentials::basic("user", "pass");
        assert_eq!(creds.pair(), Some(("user", "pass")));
    }
}
