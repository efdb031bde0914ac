//! npm registry client.

use super::error::PkgError;
use super::semver::{select_best_match, Version};
use crate::config::Config;
use crate::version::USER_AGENT;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Attempts per request for transient failures.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry; doubled on each further attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Registry client for listing versions and deriving tarball URLs.
#[derive(Clone)]
pub struct RegistryClient {
    /// Registry root without a trailing slash.
    root: String,
    base_url: Url,
    http: Client,
    auth_token: Option<String>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("root", &self.root)
            .field("auth", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

/// A concrete version picked for a specifier, with its archive URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarball {
    pub version: Version,
    pub url: String,
}

impl RegistryClient {
    /// Create a new registry client with the given root URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(root: &str, auth_token: Option<String>) -> Result<Self, PkgError> {
        let root = root.trim().trim_end_matches('/').to_string();
        let base_url = Url::parse(&root)
            .map_err(|e| PkgError::Config(format!("invalid registry URL '{root}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PkgError::network(&root, format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            root,
            base_url,
            http,
            auth_token,
        })
    }

    /// Create a client from the runtime configuration.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, PkgError> {
        Self::new(&config.registry_url, config.auth_token.clone())
    }

    /// Registry root without a trailing slash.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Get the HTTP client (for reuse in tarball downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Returns true if `url` points at the configured registry host and port.
    #[must_use]
    pub fn is_registry_host(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| {
            u.host_str() == self.base_url.host_str()
                && u.port_or_known_default() == self.base_url.port_or_known_default()
        })
    }

    /// GET `url`, retrying connection errors, timeouts and 5xx responses.
    ///
    /// The bearer token is attached only when `url` targets the registry host.
    /// Any non-5xx response is returned to the caller as-is.
    ///
    /// # Errors
    /// Returns an error once every attempt has failed.
    pub async fn get(&self, url: &str) -> Result<Response, PkgError> {
        let with_auth = self.is_registry_host(url);
        let mut attempt = 1;

        loop {
            let mut request = self.http.get(url);
            if with_auth {
                if let Some(token) = &self.auth_token {
                    request = request.bearer_auth(token);
                }
            }

            let result = match request.send().await {
                Ok(response) if response.status().is_server_error() => Err(PkgError::network(
                    url,
                    format!("server error: {}", response.status()),
                )),
                Ok(response) => Ok(response),
                Err(e) => Err(PkgError::from(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(url = %url, attempt, error = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Metadata URL for a package; `/` in scoped names is encoded as `%2F`.
    #[must_use]
    pub fn metadata_url(&self, name: &str) -> String {
        format!("{}/{}", self.root, name.replace('/', "%2F"))
    }

    /// Fetch the package metadata document.
    ///
    /// # Errors
    /// Returns an error if the request fails, the package is unknown, or the
    /// body is not JSON.
    pub async fn fetch_metadata(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        let url = self.metadata_url(name);
        info!(name = %name, url = %url, "fetching registry metadata");

        let response = self.get(&url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(PkgError::NotFound {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(PkgError::network(&url, format!("status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| PkgError::network(&url, format!("malformed metadata: {e}")))
    }

    /// List every published version of a package.
    ///
    /// # Errors
    /// Returns an error if metadata cannot be fetched or has no `versions` object.
    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>, PkgError> {
        let metadata = self.fetch_metadata(name).await?;
        get_versions(&metadata)
            .map(|versions| versions.into_iter().map(String::from).collect())
            .ok_or_else(|| {
                PkgError::network(self.metadata_url(name), "malformed metadata: missing versions")
            })
    }

    /// Pick the best published version for `specifier` and derive its archive URL.
    ///
    /// Versions are always listed, even for an exact specifier.
    ///
    /// # Errors
    /// Returns network errors, or a semver error when nothing matches.
    pub async fn resolve(&self, name: &str, specifier: &str) -> Result<ResolvedTarball, PkgError> {
        let versions = self.list_versions(name).await?;
        let version = select_best_match(specifier, &versions)?;
        let url = tarball_url(&self.root, name, &version.to_string());
        debug!(name = %name, specifier = %specifier, version = %version, "resolved");
        Ok(ResolvedTarball { version, url })
    }
}

/// Derive the canonical archive URL for a package version.
///
/// `@scope/pkg` → `<root>/@scope/pkg/-/pkg-<v>.tgz`, `pkg` → `<root>/pkg/-/pkg-<v>.tgz`.
#[must_use]
pub fn tarball_url(root: &str, name: &str, version: &str) -> String {
    let root = root.trim_end_matches('/');
    let basename = name.rsplit('/').next().unwrap_or(name);
    format!("{root}/{name}/-/{basename}-{version}.tgz")
}

/// Get all available version strings from a metadata document.
///
/// Returns `None` when `versions` is missing or not an object.
#[must_use]
pub fn get_versions(metadata: &serde_json::Value) -> Option<Vec<&str>> {
    metadata
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_tarball_url_unscoped() {
        assert_eq!(
            tarball_url("https://registry.npmjs.org", "pkg", "1.0.0"),
            "https://registry.npmjs.org/pkg/-/pkg-1.0.0.tgz"
        );
    }

    #[test]
    fn test_tarball_url_scoped() {
        assert_eq!(
            tarball_url("https://registry.npmjs.org/", "@scope/pkg", "1.0.0"),
            "https://registry.npmjs.org/@scope/pkg/-/pkg-1.0.0.tgz"
        );
    }

    #[test]
    fn test_get_versions() {
        let metadata = serde_json::json!({
            "name": "react",
            "versions": {
                "18.2.0": {},
                "18.1.0": {},
                "17.0.2": {}
            }
        });

        let versions = get_versions(&metadata).unwrap();
        assert_eq!(versions.len(), 3);
        assert!(versions.contains(&"18.2.0"));
        assert!(versions.contains(&"17.0.2"));

        assert!(get_versions(&serde_json::json!({"versions": []})).is_none());
        assert!(get_versions(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_metadata_url_encodes_scope() {
        let client = RegistryClient::new("http://localhost:4873/", None).unwrap();
        assert_eq!(client.metadata_url("@types/node"), "http://localhost:4873/@types%2Fnode");
        assert_eq!(client.metadata_url("lodash"), "http://localhost:4873/lodash");
    }

    #[test]
    fn test_client_invalid_url() {
        let err = RegistryClient::new("not-a-url", None).unwrap_err();
        assert_eq!(err.code(), "PKG_CONFIG_INVALID");
    }

    #[test]
    fn test_is_registry_host() {
        let client = RegistryClient::new("https://registry.npmjs.org", None).unwrap();
        assert!(client.is_registry_host("https://registry.npmjs.org/pkg/-/pkg-1.0.0.tgz"));
        assert!(client.is_registry_host("https://registry.npmjs.org:443/x"));
        assert!(!client.is_registry_host("https://evil.example.com/pkg.tgz"));
        assert!(!client.is_registry_host("https://registry.npmjs.org:8443/x"));
        assert!(!client.is_registry_host("not a url"));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = RegistryClient::new("http://localhost", Some("s3cret".into())).unwrap();
        assert!(!format!("{client:?}").contains("s3cret"));
    }

    #[tokio::test]
    async fn test_resolve_picks_best_and_sends_auth() {
        let app = Router::new().route(
            "/:name",
            get(|Path(name): Path<String>, headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer tok");
                if !authorized {
                    return Err(AxumStatus::UNAUTHORIZED);
                }
                assert_eq!(name, "@scope/lib");
                Ok(Json(serde_json::json!({
                    "versions": {"1.0.0": {}, "1.4.2": {}, "2.0.0": {}}
                })))
            }),
        );
        let base = serve(app).await;

        let client = RegistryClient::new(&base, Some("tok".into())).unwrap();
        let resolved = client.resolve("@scope/lib", "^1.0.0").await.unwrap();
        assert_eq!(resolved.version.to_string(), "1.4.2");
        assert_eq!(resolved.url, format!("{base}/@scope/lib/-/lib-1.4.2.tgz"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let app = Router::new().route("/:name", get(|| async { AxumStatus::NOT_FOUND }));
        let base = serve(app).await;

        let client = RegistryClient::new(&base, None).unwrap();
        let err = client.list_versions("missing").await.unwrap_err();
        assert!(matches!(err, PkgError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_malformed_metadata() {
        let app = Router::new().route(
            "/:name",
            get(|| async { Json(serde_json::json!({"name": "x"})) }),
        );
        let base = serve(app).await;

        let client = RegistryClient::new(&base, None).unwrap();
        let err = client.list_versions("x").await.unwrap_err();
        assert!(matches!(err, PkgError::Network { .. }));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/:name",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(AxumStatus::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(serde_json::json!({"versions": {"0.1.0": {}}})))
                    }
                }
            }),
        );
        let base = serve(app).await;

        let client = RegistryClient::new(&base, None).unwrap();
        let versions = client.list_versions("flaky").await.unwrap();
        assert_eq!(versions, vec!["0.1.0"]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_match_is_semver_error() {
        let app = Router::new().route(
            "/:name",
            get(|| async { Json(serde_json::json!({"versions": {"1.0.0": {}}})) }),
        );
        let base = serve(app).await;

        let client = RegistryClient::new(&base, None).unwrap();
        let err = client.resolve("a", "^2.0.0").await.unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_NO_MATCH);
    }
}
