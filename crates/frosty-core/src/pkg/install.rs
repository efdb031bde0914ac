//! Install orchestration.
//!
//! Walks a dependency map depth-first, installing each entry into
//! `<root>/node_modules/<name>` and then its own dependencies into that
//! package's nested `node_modules`. Siblings are installed concurrently.
//!
//! Per dependency:
//! 1. claim the target directory; if it already exists the dependency is
//!    considered installed and nothing else happens
//! 2. classify the specifier (registry, direct URL, `file:`, VCS)
//! 3. copy from the module cache on a hit, otherwise resolve, download and
//!    extract (or copy a local directory)
//! 4. install the package's own dependencies
//! 5. run `install`/`postinstall` unless the tree came from the cache
//! 6. store fresh registry installs in the module cache and index them
//! 7. link the package's binaries
//!
//! A dependency whose `(name, specifier)` already appears among its own
//! ancestors is a cycle and fails before anything is claimed.
//!
//! The cache index is committed once, after the whole walk.

use super::cache::{CacheIndex, PackageCache};
use super::error::PkgError;
use super::install_context::{InstallContext, InstallFailure, InstallOrigin, InstallReport};
use super::link::link_binaries;
use super::module::{
    DependencyTransform, IdentityTransform, MirrorTransform, ModuleDescriptor, SourceKind,
};
use super::package::{Package, PACKAGE_JSON};
use super::registry::RegistryClient;
use super::scripts::run_lifecycle;
use super::tarball::{download_tarball, extract, MAX_TARBALL_SIZE, REGISTRY_STRIP};
use crate::config::{Config, DEFAULT_CONCURRENCY};
use crate::paths::node_modules_dir;
use frosty_util::fs::{copy_dir_all, copy_dir_filtered};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// Knobs for an install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Keep installing siblings after a failure.
    pub force: bool,
    /// Maximum sibling installs (and downloads) in flight.
    pub concurrency: usize,
    /// Shell for lifecycle scripts, overriding the platform default.
    pub script_shell: Option<String>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            force: false,
            concurrency: DEFAULT_CONCURRENCY,
            script_shell: None,
        }
    }
}

impl InstallOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            force: config.force,
            concurrency: config.concurrency.max(1),
            script_shell: config.script_shell.clone(),
        }
    }
}

/// Drives one install run.
pub struct Installer {
    registry: RegistryClient,
    cache: PackageCache,
    index: Mutex<CacheIndex>,
    context: Mutex<InstallContext>,
    transform: Arc<dyn DependencyTransform>,
    downloads: Semaphore,
    options: InstallOptions,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Installer {
    #[must_use]
    pub fn new(
        registry: RegistryClient,
        cache: PackageCache,
        index: CacheIndex,
        options: InstallOptions,
    ) -> Self {
        Self {
            registry,
            cache,
            index: Mutex::new(index),
            context: Mutex::new(InstallContext::new()),
            transform: Arc::new(IdentityTransform),
            downloads: Semaphore::new(options.concurrency.max(1)),
            options,
        }
    }

    /// Build an installer from the runtime configuration.
    ///
    /// Configured mirrors become a [`MirrorTransform`].
    ///
    /// # Errors
    /// Returns an error if the registry client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, PkgError> {
        let registry = RegistryClient::from_config(config)?;
        let transform: Arc<dyn DependencyTransform> = if config.mirrors.is_empty() {
            Arc::new(IdentityTransform)
        } else {
            Arc::new(MirrorTransform::new(registry.root(), &config.mirrors))
        };

        Ok(Self::new(
            registry,
            PackageCache::from_config(config),
            CacheIndex::load(&config.cache_index_dir()),
            InstallOptions::from_config(config),
        )
        .with_transform(transform))
    }

    /// Replace the dependency transform hook.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn DependencyTransform>) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Install the `dependencies` of `<project_dir>/package.json`.
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be read, or the first install
    /// failure when not in force mode.
    pub async fn install_project(&self, project_dir: &Path) -> Result<InstallReport, PkgError> {
        let manifest = Package::load(project_dir)?;
        info!(
            dir = %project_dir.display(),
            dependencies = manifest.dependencies.len(),
            "installing project"
        );
        self.install_dependencies(
            &manifest.dependencies,
            project_dir,
            &node_modules_dir(project_dir),
        )
        .await
    }

    /// Install `dependencies` into `node_modules`.
    ///
    /// `base_dir` is the directory of the manifest that declared them; local
    /// `file:` paths are resolved against it. The cache index is committed
    /// afterwards even when the walk failed.
    ///
    /// # Errors
    /// Returns the first install failure (when not in force mode) or a
    /// commit failure.
    pub async fn install_dependencies(
        &self,
        dependencies: &BTreeMap<String, String>,
        base_dir: &Path,
        node_modules: &Path,
    ) -> Result<InstallReport, PkgError> {
        let walk = self
            .install_all(dependencies, base_dir, node_modules, &[])
            .await;
        let commit = self.index.lock().await.commit();
        walk?;
        commit?;

        let report = std::mem::take(&mut *self.context.lock().await).into_report();
        info!(
            installed = report.installed.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "install finished"
        );
        Ok(report)
    }

    /// Install one level of siblings.
    ///
    /// `ancestors` is the `(name, specifier)` chain of the packages whose
    /// `node_modules` this level lives in.
    fn install_all<'a>(
        &'a self,
        dependencies: &'a BTreeMap<String, String>,
        base_dir: &'a Path,
        node_modules: &'a Path,
        ancestors: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<(), PkgError>> {
        Box::pin(async move {
            let pending: Vec<BoxFuture<'a, (&'a str, &'a str, Result<(), PkgError>)>> =
                dependencies
                    .iter()
                    .map(move |(name, specifier)| -> BoxFuture<'a, _> {
                        Box::pin(async move {
                            let result = self
                                .install_one(name, specifier, base_dir, node_modules, ancestors)
                                .await;
                            (name.as_str(), specifier.as_str(), result)
                        })
                    })
                    .collect();

            let mut installs =
                stream::iter(pending).buffer_unordered(self.options.concurrency.max(1));

            while let Some((name, specifier, result)) = installs.next().await {
                let Err(err) = result else {
                    continue;
                };
                if !self.options.force {
                    return Err(err);
                }
                warn!(name = %name, specifier = %specifier, error = %err, "install failed, continuing");
                self.context.lock().await.record_failure(InstallFailure {
                    name: name.to_string(),
                    specifier: specifier.to_string(),
                    code: err.code().to_string(),
                    message: err.root_cause().to_string(),
                });
            }
            Ok(())
        })
    }

    async fn install_one(
        &self,
        name: &str,
        specifier: &str,
        base_dir: &Path,
        node_modules: &Path,
        ancestors: &[(String, String)],
    ) -> Result<(), PkgError> {
        if let Some(err) = cycle_error(ancestors, name, specifier) {
            return Err(err.in_install(name, specifier));
        }

        let target = node_modules.join(name);
        let claim = claim_dir(&target).map_err(|e| PkgError::from(e).in_install(name, specifier))?;
        let Some(claim) = claim else {
            debug!(name = %name, dir = %target.display(), "already present");
            self.context.lock().await.record_skipped();
            return Ok(());
        };

        self.install_into(name, specifier, base_dir, node_modules, &target, ancestors)
            .await
            .map_err(|e| e.in_install(name, specifier))?;
        claim.keep();
        Ok(())
    }

    async fn install_into(
        &self,
        name: &str,
        specifier: &str,
        base_dir: &Path,
        node_modules: &Path,
        target: &Path,
        ancestors: &[(String, String)],
    ) -> Result<(), PkgError> {
        let descriptor = ModuleDescriptor::from_dependency(name, specifier, base_dir);

        let (origin, resolved_url) = match descriptor.source_kind {
            SourceKind::UnsupportedVcs => {
                return Err(PkgError::UnsupportedSource {
                    name: name.to_string(),
                    specifier: specifier.to_string(),
                });
            }
            SourceKind::LocalPath => {
                copy_local(&descriptor, target)?;
                (InstallOrigin::Local, None)
            }
            SourceKind::RegistryTarball => {
                if self.restore_from_cache(&descriptor, target).await? {
                    (InstallOrigin::Cache, None)
                } else {
                    let fetched = self.fetch(descriptor.clone(), target).await?;
                    (InstallOrigin::Network, fetched.resolved_url)
                }
            }
        };

        let mut pkg = Package::load(target)?;
        if let Some(url) = &resolved_url {
            pkg.set_resolved(url);
            pkg.save()?;
        }

        let mut lineage = ancestors.to_vec();
        lineage.push((name.to_string(), specifier.to_string()));
        self.install_all(&pkg.dependencies, target, &node_modules_dir(target), &lineage)
            .await?;

        if origin != InstallOrigin::Cache {
            run_lifecycle(&pkg, self.options.script_shell.as_deref()).await?;
        }

        let stored = if origin == InstallOrigin::Network && descriptor.is_cacheable {
            self.populate_cache(name, specifier, &pkg).await?
        } else {
            None
        };

        link_binaries(&pkg, node_modules)?;

        let mut context = self.context.lock().await;
        context.add(name, &pkg.version, specifier, target, origin);
        if let Some(dir) = stored {
            context.set_cache_dir(name, &pkg.version, dir);
        }
        Ok(())
    }

    /// Copy an indexed tree into `target`. A stale entry is dropped and
    /// reported as a miss.
    async fn restore_from_cache(
        &self,
        descriptor: &ModuleDescriptor,
        target: &Path,
    ) -> Result<bool, PkgError> {
        let name = &descriptor.name;
        let specifier = &descriptor.specifier;

        let cached = {
            let index = self.index.lock().await;
            index.lookup(name, specifier).map(Path::to_path_buf)
        };
        let Some(cached) = cached else {
            debug!(name = %name, specifier = %specifier, "cache miss");
            return Ok(false);
        };

        if !cached.join(PACKAGE_JSON).is_file() {
            debug!(
                name = %name,
                specifier = %specifier,
                path = %cached.display(),
                "stale cache entry"
            );
            self.index.lock().await.remove(name, specifier);
            return Ok(false);
        }

        copy_dir_all(&cached, target).map_err(|e| {
            PkgError::cache(format!(
                "failed to copy {} from {}: {e}",
                name,
                cached.display()
            ))
        })?;
        debug!(name = %name, specifier = %specifier, path = %cached.display(), "cache hit");
        Ok(true)
    }

    /// Resolve, download and extract into `target`.
    ///
    /// Returns the descriptor with `resolved_url` set to the candidate that
    /// was actually fetched.
    async fn fetch(
        &self,
        mut descriptor: ModuleDescriptor,
        target: &Path,
    ) -> Result<ModuleDescriptor, PkgError> {
        if descriptor.needs_registry_resolution() {
            let resolved = self
                .registry
                .resolve(&descriptor.name, &descriptor.specifier)
                .await?;
            debug!(
                name = %descriptor.name,
                specifier = %descriptor.specifier,
                version = %resolved.version,
                "resolved version"
            );
            descriptor.download_candidate_urls.push(resolved.url);
        }
        let mut descriptor = self.transform.transform(descriptor)?;

        let _permit = self.downloads.acquire().await.ok();
        let mut last_error = None;
        for url in descriptor.download_candidate_urls.clone() {
            match self.download_into(&url, target).await {
                Ok(files) => {
                    debug!(name = %descriptor.name, url = %url, files, "fetched package");
                    descriptor.resolved_url = Some(url);
                    return Ok(descriptor);
                }
                Err(err) => {
                    warn!(name = %descriptor.name, url = %url, error = %err, "download candidate failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PkgError::network(&descriptor.specifier, "no download candidates")
        }))
    }

    async fn download_into(&self, url: &str, target: &Path) -> Result<usize, PkgError> {
        let bytes = download_tarball(&self.registry, url, MAX_TARBALL_SIZE).await?;
        extract(bytes.as_ref(), target, REGISTRY_STRIP)
    }

    /// Store a fresh install in the module cache and index it.
    ///
    /// Returns the stored directory.
    async fn populate_cache(
        &self,
        name: &str,
        specifier: &str,
        pkg: &Package,
    ) -> Result<Option<PathBuf>, PkgError> {
        if pkg.version.is_empty() {
            debug!(name = %name, "package has no version, not caching");
            return Ok(None);
        }

        let already = self
            .context
            .lock()
            .await
            .cache_dir(name, &pkg.version)
            .map(Path::to_path_buf);
        let stored = match already {
            Some(dir) => dir,
            None => self.cache.store(name, &pkg.version, &pkg.dir)?,
        };

        self.index.lock().await.add(name, specifier, stored.clone());
        debug!(name = %name, specifier = %specifier, path = %stored.display(), "cached package");
        Ok(Some(stored))
    }
}

/// The cycle error if `name@specifier` already appears among `ancestors`.
fn cycle_error(ancestors: &[(String, String)], name: &str, specifier: &str) -> Option<PkgError> {
    let start = ancestors
        .iter()
        .position(|(n, s)| n == name && s == specifier)?;
    let mut chain: Vec<String> = ancestors[start..]
        .iter()
        .map(|(n, s)| format!("{n}@{s}"))
        .collect();
    chain.push(format!("{name}@{specifier}"));
    Some(PkgError::DependencyCycle {
        name: name.to_string(),
        chain: chain.join(" -> "),
    })
}

/// Copy a `file:` dependency, leaving out its `node_modules`.
fn copy_local(descriptor: &ModuleDescriptor, target: &Path) -> Result<(), PkgError> {
    let Some(source) = descriptor.local_path.as_deref() else {
        return Err(PkgError::UnsupportedSource {
            name: descriptor.name.clone(),
            specifier: descriptor.specifier.clone(),
        });
    };
    let manifest = source.join(PACKAGE_JSON);
    if !manifest.is_file() {
        return Err(PkgError::package_json(manifest, "local dependency has no package.json"));
    }

    let files = copy_dir_filtered(source, target, |rel| rel == Path::new("node_modules"))?;
    debug!(name = %descriptor.name, source = %source.display(), files, "copied local package");
    Ok(())
}

/// Atomically create `target`. `None` means it already existed.
fn claim_dir(target: &Path) -> io::Result<Option<ClaimedDir>> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(target) {
        Ok(()) => Ok(Some(ClaimedDir {
            path: target.to_path_buf(),
            keep: false,
        })),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

/// A freshly created install directory, removed on drop unless kept
/// (including when the install future is dropped mid-way).
struct ClaimedDir {
    path: PathBuf,
    keep: bool,
}

impl ClaimedDir {
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for ClaimedDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(dir = %self.path.display(), "removed incomplete install"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.path.display(), error = %e, "failed to remove incomplete install"),
        }
    }
}
