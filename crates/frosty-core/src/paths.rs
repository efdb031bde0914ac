use std::path::{Path, PathBuf};

/// Environment variable overriding the frosty home directory.
pub const HOME_ENV: &str = "FROSTY_HOME";

/// Environment variable overriding the registry root URL.
pub const REGISTRY_ENV: &str = "NPM_REGISTRY_URL";

/// Environment variable holding the registry bearer token.
pub const TOKEN_ENV: &str = "NPM_TOKEN";

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Name of the optional project configuration file.
pub const CONFIG_FILE: &str = "frosty.json";

/// Get the frosty home directory.
///
/// `$FROSTY_HOME` if set and non-empty, otherwise `~/.frosty`.
#[must_use]
pub fn frosty_home() -> PathBuf {
    match std::env::var_os(HOME_ENV) {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs_next::home_dir().map_or_else(|| PathBuf::from(".frosty"), |p| p.join(".frosty")),
    }
}

/// Get the registry root URL from `$NPM_REGISTRY_URL` or the default.
#[must_use]
pub fn registry_url() -> String {
    std::env::var(REGISTRY_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
}

/// Get the registry auth token from `$NPM_TOKEN`, if any.
#[must_use]
pub fn auth_token() -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Directory holding copied package trees: `<home>/cache/modules`.
#[must_use]
pub fn cache_modules_dir(home: &Path) -> PathBuf {
    home.join("cache").join("modules")
}

/// Directory holding per-module index files: `<home>/cache/index`.
#[must_use]
pub fn cache_index_dir(home: &Path) -> PathBuf {
    home.join("cache").join("index")
}

/// The `node_modules` directory under `dir`.
#[must_use]
pub fn node_modules_dir(dir: &Path) -> PathBuf {
    dir.join("node_modules")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_frosty_home_env_override() {
        std::env::set_var(HOME_ENV, "/tmp/frosty-test-home");
        assert_eq!(frosty_home(), PathBuf::from("/tmp/frosty-test-home"));
        std::env::remove_var(HOME_ENV);
    }

    #[test]
    #[serial]
    fn test_frosty_home_default() {
        std::env::remove_var(HOME_ENV);
        let home = frosty_home();
        assert!(home.ends_with(".frosty"));
    }

    #[test]
    #[serial]
    fn test_registry_url_default_and_override() {
        std::env::remove_var(REGISTRY_ENV);
        assert_eq!(registry_url(), DEFAULT_REGISTRY);

        std::env::set_var(REGISTRY_ENV, "http://localhost:4873");
        assert_eq!(registry_url(), "http://localhost:4873");
        std::env::remove_var(REGISTRY_ENV);
    }

    #[test]
    #[serial]
    fn test_auth_token_empty_is_none() {
        std::env::set_var(TOKEN_ENV, "  ");
        assert_eq!(auth_token(), None);

        std::env::set_var(TOKEN_ENV, "secret");
        assert_eq!(auth_token().as_deref(), Some("secret"));
        std::env::remove_var(TOKEN_ENV);
    }

    #[test]
    fn test_cache_layout() {
        let home = Path::new("/h");
        assert_eq!(cache_modules_dir(home), PathBuf::from("/h/cache/modules"));
        assert_eq!(cache_index_dir(home), PathBuf::from("/h/cache/index"));
        assert_eq!(node_modules_dir(home), PathBuf::from("/h/node_modules"));
    }
}
