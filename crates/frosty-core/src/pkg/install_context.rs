//! Per-run bookkeeping of installed modules.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How a module's contents reached its install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOrigin {
    Network,
    Cache,
    Local,
}

/// One `(name, version)` installed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledModule {
    pub name: String,
    pub version: String,
    /// Origin of the first install of this version in the run.
    pub origin: InstallOrigin,
    /// Distinct specifiers that resolved to this version.
    pub specifiers: Vec<String>,
    /// Distinct directories it was installed into.
    pub install_dirs: Vec<PathBuf>,
    /// Module store directory, once stored during this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl InstalledModule {
    fn add_specifier(&mut self, specifier: &str) {
        if !self.specifiers.iter().any(|s| s == specifier) {
            self.specifiers.push(specifier.to_string());
        }
    }

    fn add_install_dir(&mut self, dir: &Path) {
        if !self.install_dirs.iter().any(|d| d == dir) {
            self.install_dirs.push(dir.to_path_buf());
        }
    }
}

/// A dependency that failed to install (collected in force mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallFailure {
    pub name: String,
    pub specifier: String,
    pub code: String,
    pub message: String,
}

/// Tracks what one install run did.
#[derive(Debug, Default)]
pub struct InstallContext {
    modules: BTreeMap<(String, String), InstalledModule>,
    skipped: usize,
    failures: Vec<InstallFailure>,
}

impl InstallContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name@version` was installed into `dir` via `specifier`.
    pub fn add(
        &mut self,
        name: &str,
        version: &str,
        specifier: &str,
        dir: &Path,
        origin: InstallOrigin,
    ) {
        let module = self
            .modules
            .entry((name.to_string(), version.to_string()))
            .or_insert_with(|| InstalledModule {
                name: name.to_string(),
                version: version.to_string(),
                origin,
                specifiers: Vec::new(),
                install_dirs: Vec::new(),
                cache_dir: None,
            });
        module.add_specifier(specifier);
        module.add_install_dir(dir);
    }

    #[must_use]
    pub fn get(&self, name: &str, version: &str) -> Option<&InstalledModule> {
        self.modules.get(&(name.to_string(), version.to_string()))
    }

    /// Module store directory already populated for `name@version` this run.
    #[must_use]
    pub fn cache_dir(&self, name: &str, version: &str) -> Option<&Path> {
        self.get(name, version)?.cache_dir.as_deref()
    }

    /// Remember where `name@version` was stored.
    pub fn set_cache_dir(&mut self, name: &str, version: &str, dir: PathBuf) {
        if let Some(module) = self
            .modules
            .get_mut(&(name.to_string(), version.to_string()))
        {
            module.cache_dir = Some(dir);
        }
    }

    /// Count a dependency whose directory already existed.
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, failure: InstallFailure) {
        self.failures.push(failure);
    }

    /// Number of distinct `(name, version)` pairs installed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[must_use]
    pub fn into_report(self) -> InstallReport {
        InstallReport {
            installed: self.modules.into_values().collect(),
            skipped: self.skipped,
            failures: self.failures,
        }
    }
}

/// Summary of an install run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<InstalledModule>,
    /// Dependencies skipped because their directory already existed.
    pub skipped: usize,
    pub failures: Vec<InstallFailure>,
}

impl InstallReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of installed versions that came from `origin`.
    #[must_use]
    pub fn count(&self, origin: InstallOrigin) -> usize {
        self.installed.iter().filter(|m| m.origin == origin).count()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&InstalledModule> {
        self.installed.iter().find(|m| m.name == name)
    }
}
