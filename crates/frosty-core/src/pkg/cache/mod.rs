//! Package cache management.
//!
//! Manages the global module store where installed package trees are kept,
//! `<home>/cache/modules/<name>/<version>/`, and the specifier index that
//! points into it.

mod index;

pub use index::{CacheIndex, ModuleIndex};

use super::error::PkgError;
use crate::config::Config;
use frosty_util::fs::copy_dir_filtered;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Package cache manager.
#[derive(Debug, Clone)]
pub struct PackageCache {
    /// Root directory for stored package trees.
    root: PathBuf,
}

impl PackageCache {
    /// Create a cache rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the cache under the configured home directory.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_modules_dir())
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory for a stored package version.
    ///
    /// Scoped names nest under their scope: `@scope/name/<version>`.
    #[must_use]
    pub fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        match name.split_once('/') {
            Some((scope, rest)) if name.starts_with('@') => {
                self.root.join(scope).join(rest).join(version)
            }
            _ => self.root.join(name).join(version),
        }
    }

    /// Check if a package version is already stored.
    #[must_use]
    pub fn is_cached(&self, name: &str, version: &str) -> bool {
        self.version_dir(name, version).is_dir()
    }

    /// Copy an installed package tree into the store.
    ///
    /// The package's own `node_modules` is left out. The copy lands in a
    /// temp directory next to its destination and is renamed into place, so
    /// readers never see a half-written version. An existing directory for
    /// the same version is reused as-is.
    ///
    /// # Errors
    /// Returns an error if the copy or rename fails.
    pub fn store(&self, name: &str, version: &str, source: &Path) -> Result<PathBuf, PkgError> {
        let dest = self.version_dir(name, version);
        if self.is_cached(name, version) {
            debug!(name = %name, version = %version, "module already stored");
            return Ok(dest);
        }

        let parent = dest
            .parent()
            .ok_or_else(|| PkgError::cache(format!("invalid cache path {}", dest.display())))?;
        fs::create_dir_all(parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".frosty-store-")
            .tempdir_in(parent)?;

        copy_dir_filtered(source, staging.path(), |rel| rel == Path::new("node_modules"))
            .map_err(|e| {
                PkgError::cache(format!(
                    "failed to copy {} into cache: {e}",
                    source.display()
                ))
            })?;

        match fs::rename(staging.path(), &dest) {
            Ok(()) => {
                debug!(name = %name, version = %version, dest = %dest.display(), "stored module");
                Ok(dest)
            }
            // Another worker stored the same version first.
            Err(_) if self.is_cached(name, version) => Ok(dest),
            Err(e) => Err(PkgError::cache(format!(
                "failed to move module into {}: {e}",
                dest.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_package(dir: &Path) {
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::create_dir_all(dir.join("node_modules").join("dep")).unwrap();
        fs::write(dir.join("package.json"), r#"{"name":"a","version":"1.0.0"}"#).unwrap();
        fs::write(dir.join("lib").join("index.js"), "x").unwrap();
        fs::write(dir.join("node_modules").join("dep").join("index.js"), "d").unwrap();
    }

    #[test]
    fn test_version_dir() {
        let cache = PackageCache::new(PathBuf::from("/cache/modules"));
        assert_eq!(
            cache.version_dir("lodash", "4.17.21"),
            PathBuf::from("/cache/modules/lodash/4.17.21")
        );
        assert_eq!(
            cache.version_dir("@types/node", "20.0.0"),
            PathBuf::from("/cache/modules/@types/node/20.0.0")
        );
    }

    #[test]
    fn test_store_excludes_node_modules() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("project").join("node_modules").join("a");
        make_package(&source);

        let cache = PackageCache::new(dir.path().join("modules"));
        let stored = cache.store("a", "1.0.0", &source).unwrap();

        assert_eq!(stored, cache.version_dir("a", "1.0.0"));
        assert!(stored.join("package.json").is_file());
        assert!(stored.join("lib").join("index.js").is_file());
        assert!(!stored.join("node_modules").exists());
        assert!(cache.is_cached("a", "1.0.0"));
    }

    #[test]
    fn test_store_reuses_existing_version() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        make_package(&source);

        let cache = PackageCache::new(dir.path().join("modules"));
        let first = cache.store("a", "1.0.0", &source).unwrap();
        fs::write(first.join("marker"), "keep").unwrap();

        let second = cache.store("a", "1.0.0", &source).unwrap();
        assert_eq!(first, second);
        assert!(second.join("marker").exists());
    }

    #[test]
    fn test_store_leaves_no_staging_dirs() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        make_package(&source);

        let cache = PackageCache::new(dir.path().join("modules"));
        cache.store("@scope/a", "2.0.0", &source).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("modules").join("@scope").join("a"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".frosty-store-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_store_missing_source_fails() {
        let dir = tempdir().unwrap();
        let cache = PackageCache::new(dir.path().join("modules"));
        assert!(cache.store("a", "1.0.0", &dir.path().join("missing")).is_err());
        assert!(!cache.is_cached("a", "1.0.0"));
    }
}
