//! Package manager error types.

use super::semver::SemverError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Package manager error codes.
pub mod codes {
    pub const PKG_SEMVER_INVALID: &str = "PKG_SEMVER_INVALID";
    pub const PKG_NO_MATCH: &str = "PKG_NO_MATCH";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_NETWORK_ERROR: &str = "PKG_NETWORK_ERROR";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_UNSUPPORTED_ENTRY: &str = "PKG_UNSUPPORTED_ENTRY";
    pub const PKG_SCRIPT_FAILED: &str = "PKG_SCRIPT_FAILED";
    pub const PKG_UNSUPPORTED_SOURCE: &str = "PKG_UNSUPPORTED_SOURCE";
    pub const PKG_PACKAGE_JSON_INVALID: &str = "PKG_PACKAGE_JSON_INVALID";
    pub const PKG_CACHE_ERROR: &str = "PKG_CACHE_ERROR";
    pub const PKG_LINK_FAILED: &str = "PKG_LINK_FAILED";
    pub const PKG_IO_ERROR: &str = "PKG_IO_ERROR";
    pub const PKG_CONFIG_INVALID: &str = "PKG_CONFIG_INVALID";
    pub const PKG_DEPENDENCY_CYCLE: &str = "PKG_DEPENDENCY_CYCLE";
}

/// Package manager error.
#[derive(Debug, Error)]
pub enum PkgError {
    #[error(transparent)]
    Semver(#[from] SemverError),

    #[error("package not found in registry: {name}")]
    NotFound { name: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("failed to extract into {}: {message}", .path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("unsupported archive entry '{entry}' ({kind})")]
    UnsupportedEntryType { entry: String, kind: String },

    #[error("{script} script `{command}` failed in {} ({status})\n{output}", .dir.display())]
    ScriptExecution {
        script: String,
        command: String,
        dir: PathBuf,
        status: String,
        output: String,
    },

    #[error("unsupported dependency source for {name}: {specifier}")]
    UnsupportedSource { name: String, specifier: String },

    #[error("invalid package.json at {}: {message}", .path.display())]
    PackageJson { path: PathBuf, message: String },

    #[error("dependency cycle: {chain}")]
    DependencyCycle { name: String, chain: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("link error: {0}")]
    Link(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to install {name}@{specifier}: {source}")]
    Install {
        name: String,
        specifier: String,
        #[source]
        source: Box<PkgError>,
    },
}

impl PkgError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Semver(SemverError::NoMatch { .. }) => codes::PKG_NO_MATCH,
            Self::Semver(_) => codes::PKG_SEMVER_INVALID,
            Self::NotFound { .. } => codes::PKG_NOT_FOUND,
            Self::Network { .. } => codes::PKG_NETWORK_ERROR,
            Self::Extraction { .. } => codes::PKG_EXTRACT_FAILED,
            Self::UnsupportedEntryType { .. } => codes::PKG_UNSUPPORTED_ENTRY,
            Self::ScriptExecution { .. } => codes::PKG_SCRIPT_FAILED,
            Self::UnsupportedSource { .. } => codes::PKG_UNSUPPORTED_SOURCE,
            Self::PackageJson { .. } => codes::PKG_PACKAGE_JSON_INVALID,
            Self::DependencyCycle { .. } => codes::PKG_DEPENDENCY_CYCLE,
            Self::Cache(_) => codes::PKG_CACHE_ERROR,
            Self::Link(_) => codes::PKG_LINK_FAILED,
            Self::Config(_) => codes::PKG_CONFIG_INVALID,
            Self::Io(_) => codes::PKG_IO_ERROR,
            Self::Install { source, .. } => source.code(),
        }
    }

    /// Create a network error for `url`.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an extraction error for `path`.
    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a package.json error for `path`.
    pub fn package_json(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PackageJson {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a link error.
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }

    /// Wrap an error with the module that was being installed.
    ///
    /// Already-wrapped errors are returned unchanged so the innermost
    /// module stays the reported origin.
    #[must_use]
    pub fn in_install(self, name: &str, specifier: &str) -> Self {
        match self {
            Self::Install { .. } => self,
            other => Self::Install {
                name: name.to_string(),
                specifier: specifier.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, unwrapping install context.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Install { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true for failures worth retrying (connect errors, timeouts, 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { message, .. } => {
                message.starts_with("connection failed")
                    || message.starts_with("request timed out")
                    || message.starts_with("server error")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(ToString::to_string).unwrap_or_default();
        if e.is_timeout() {
            Self::network(url, format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::network(url, format!("connection failed: {e}"))
        } else {
            Self::network(url, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_uppercase() {
        // All codes should be SCREAMING_SNAKE_CASE
        let all_codes = [
            codes::PKG_SEMVER_INVALID,
            codes::PKG_NO_MATCH,
            codes::PKG_NOT_FOUND,
            codes::PKG_NETWORK_ERROR,
            codes::PKG_EXTRACT_FAILED,
            codes::PKG_UNSUPPORTED_ENTRY,
            codes::PKG_SCRIPT_FAILED,
            codes::PKG_UNSUPPORTED_SOURCE,
            codes::PKG_PACKAGE_JSON_INVALID,
            codes::PKG_CACHE_ERROR,
            codes::PKG_LINK_FAILED,
            codes::PKG_IO_ERROR,
            codes::PKG_CONFIG_INVALID,
            codes::PKG_DEPENDENCY_CYCLE,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn test_semver_codes() {
        let invalid: PkgError = SemverError::invalid_range("~>=1", "conflicting range modifiers").into();
        assert_eq!(invalid.code(), codes::PKG_SEMVER_INVALID);

        let no_match: PkgError = SemverError::NoMatch {
            range: "^2".into(),
            candidates: vec!["1.0.0".into()],
        }
        .into();
        assert_eq!(no_match.code(), codes::PKG_NO_MATCH);
    }

    #[test]
    fn test_install_wrapping_keeps_innermost_origin() {
        let err = PkgError::UnsupportedSource {
            name: "dep".into(),
            specifier: "git+https://example.com/dep.git".into(),
        }
        .in_install("dep", "git+https://example.com/dep.git")
        .in_install("parent", "^1.0.0");

        match &err {
            PkgError::Install { name, .. } => assert_eq!(name, "dep"),
            other => panic!("expected Install, got {other:?}"),
        }
        assert_eq!(err.code(), codes::PKG_UNSUPPORTED_SOURCE);
        assert!(matches!(err.root_cause(), PkgError::UnsupportedSource { .. }));
    }

    #[test]
    fn test_transient_classification() {
        assert!(PkgError::network("http://x", "connection failed: refused").is_transient());
        assert!(PkgError::network("http://x", "server error: 503").is_transient());
        assert!(!PkgError::network("http://x", "status 404 Not Found").is_transient());
        assert!(!PkgError::cache("boom").is_transient());
    }
}
