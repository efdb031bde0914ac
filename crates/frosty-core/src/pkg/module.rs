//! Dependency classification and the transform hook.

use super::error::PkgError;
use std::path::{Path, PathBuf};

/// Where a dependency's contents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A gzipped tarball, from the registry or a direct URL.
    RegistryTarball,
    /// A directory on disk (`file:`).
    LocalPath,
    /// A git or hosted-repo source; always rejected.
    UnsupportedVcs,
}

/// A manifest dependency entry, classified for installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    /// Specifier exactly as written in the manifest; also the cache key.
    pub specifier: String,
    /// URL the contents were finally fetched from.
    pub resolved_url: Option<String>,
    /// URLs to try in order.
    pub download_candidate_urls: Vec<String>,
    pub source_kind: SourceKind,
    pub is_cacheable: bool,
    /// Absolute source directory for [`SourceKind::LocalPath`].
    pub local_path: Option<PathBuf>,
}

impl ModuleDescriptor {
    /// Classify `name: specifier` declared by the manifest in `base_dir`.
    #[must_use]
    pub fn from_dependency(name: &str, specifier: &str, base_dir: &Path) -> Self {
        let spec = specifier.trim();
        let mut descriptor = Self {
            name: name.to_string(),
            specifier: specifier.to_string(),
            resolved_url: None,
            download_candidate_urls: Vec::new(),
            source_kind: SourceKind::RegistryTarball,
            is_cacheable: true,
            local_path: None,
        };

        if is_vcs_specifier(spec) {
            descriptor.source_kind = SourceKind::UnsupportedVcs;
            descriptor.is_cacheable = false;
        } else if let Some(rel) = spec.strip_prefix("file:") {
            descriptor.source_kind = SourceKind::LocalPath;
            descriptor.is_cacheable = false;
            descriptor.local_path = Some(base_dir.join(rel));
        } else if descriptor.is_direct_url() {
            descriptor.download_candidate_urls.push(spec.to_string());
        }

        descriptor
    }

    /// Returns true if the specifier is itself a download URL.
    #[must_use]
    pub fn is_direct_url(&self) -> bool {
        is_tarball_url(self.specifier.trim())
    }

    /// Returns true if the registry must be asked for a version.
    #[must_use]
    pub fn needs_registry_resolution(&self) -> bool {
        self.source_kind == SourceKind::RegistryTarball && self.download_candidate_urls.is_empty()
    }
}

/// Returns true for git and hosted-repo specifiers.
///
/// Covers `git+...`, `git://...`, `git@host:...`, `github:`/`gitlab:`/`bitbucket:`
/// shorthands, URLs ending in `.git`, and bare `user/repo`.
#[must_use]
pub fn is_vcs_specifier(spec: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "git+", "git://", "git@", "github:", "gitlab:", "bitbucket:", "gist:",
    ];
    if PREFIXES.iter().any(|p| spec.starts_with(p)) {
        return true;
    }

    let without_fragment = spec.split('#').next().unwrap_or(spec);
    if is_tarball_url(spec) {
        return without_fragment.ends_with(".git");
    }

    // user/repo shorthand: one slash, no scheme, not a path
    let looks_like_path = spec.starts_with('.') || spec.starts_with('/') || spec.starts_with('@');
    !looks_like_path
        && !without_fragment.contains(':')
        && !without_fragment.contains(char::is_whitespace)
        && without_fragment.split('/').count() == 2
        && without_fragment.split('/').all(|part| !part.is_empty())
}

fn is_tarball_url(spec: &str) -> bool {
    spec.starts_with("http://") || spec.starts_with("https://")
}

/// Hook that may rewrite a descriptor before it is downloaded.
///
/// Applied once the descriptor is classified and its registry candidates
/// are known.
pub trait DependencyTransform: Send + Sync {
    fn transform(&self, descriptor: ModuleDescriptor) -> Result<ModuleDescriptor, PkgError>;
}

/// Leaves descriptors unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl DependencyTransform for IdentityTransform {
    fn transform(&self, descriptor: ModuleDescriptor) -> Result<ModuleDescriptor, PkgError> {
        Ok(descriptor)
    }
}

/// Adds mirror copies of registry-hosted candidates as fallbacks.
#[derive(Debug, Clone)]
pub struct MirrorTransform {
    registry_root: String,
    mirrors: Vec<String>,
}

impl MirrorTransform {
    #[must_use]
    pub fn new(registry_root: &str, mirrors: &[String]) -> Self {
        Self {
            registry_root: registry_root.trim_end_matches('/').to_string(),
            mirrors: mirrors
                .iter()
                .map(|m| m.trim_end_matches('/').to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl DependencyTransform for MirrorTransform {
    fn transform(&self, mut descriptor: ModuleDescriptor) -> Result<ModuleDescriptor, PkgError> {
        let mut candidates = Vec::with_capacity(descriptor.download_candidate_urls.len());

        for url in descriptor.download_candidate_urls {
            let rest = url
                .strip_prefix(&self.registry_root)
                .filter(|rest| rest.starts_with('/'))
                .map(str::to_string);
            candidates.push(url);
            if let Some(rest) = rest {
                candidates.extend(self.mirrors.iter().map(|m| format!("{m}{rest}")));
            }
        }

        descriptor.download_candidate_urls = candidates;
        Ok(descriptor)
    }
}
