//! Package manager functionality.
//!
//! Provides utilities for:
//! - Parsing versions and ranges, and picking the best match
//! - Fetching package metadata from an npm-compatible registry
//! - Downloading and extracting tarballs
//! - Managing the global module cache and its specifier index
//! - Reading and updating `package.json`
//! - Running lifecycle scripts and linking binaries
//! - Installing a dependency tree into nested `node_modules`

pub mod cache;
pub mod error;
pub mod install;
pub mod install_context;
pub mod link;
pub mod module;
pub mod package;
pub mod registry;
pub mod scripts;
pub mod semver;
pub mod tarball;

pub use cache::{CacheIndex, ModuleIndex, PackageCache};
pub use error::{codes as pkg_codes, PkgError};
pub use install::{InstallOptions, Installer};
pub use install_context::{
    InstallContext, InstallFailure, InstallOrigin, InstallReport, InstalledModule,
};
pub use link::{link_binaries, BIN_DIR};
pub use module::{
    is_vcs_specifier, DependencyTransform, IdentityTransform, MirrorTransform, ModuleDescriptor,
    SourceKind,
};
pub use package::{Package, PACKAGE_JSON};
pub use registry::{tarball_url, RegistryClient, ResolvedTarball};
pub use scripts::{run_lifecycle, run_script, LifecycleScript};
pub use semver::{satisfies, select_best_match, Range, SemverError, Version};
pub use tarball::{download_tarball, extract, MAX_TARBALL_SIZE, REGISTRY_STRIP};
