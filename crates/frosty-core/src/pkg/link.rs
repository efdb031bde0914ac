//! Binary linking into `node_modules/.bin`.

use super::error::PkgError;
use super::package::Package;
use frosty_util::fs::relative_path;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Directory under `node_modules` holding bin links.
pub const BIN_DIR: &str = ".bin";

/// Link every entry of `pkg.bin` into `<node_modules_root>/.bin`.
///
/// Each link is relative (`../<name>/<script>`), replaces any existing
/// entry of the same name, and the script is made executable.
///
/// Returns the created link paths.
///
/// # Errors
/// Returns an error if a bin entry is unsafe, its script is missing, or a
/// link cannot be created.
pub fn link_binaries(pkg: &Package, node_modules_root: &Path) -> Result<Vec<PathBuf>, PkgError> {
    if pkg.bin.is_empty() {
        return Ok(Vec::new());
    }

    let bin_dir = node_modules_root.join(BIN_DIR);
    fs::create_dir_all(&bin_dir)
        .map_err(|e| PkgError::link(format!("failed to create {}: {e}", bin_dir.display())))?;

    let mut links = Vec::with_capacity(pkg.bin.len());
    for (bin_name, script) in &pkg.bin {
        if bin_name.is_empty() || bin_name.contains(['/', '\\']) || bin_name.starts_with('.') {
            return Err(PkgError::link(format!("invalid bin name '{bin_name}' in {}", pkg.name)));
        }

        let script_rel = safe_relative(script).ok_or_else(|| {
            PkgError::link(format!("bin '{bin_name}' points outside {}: {script}", pkg.name))
        })?;
        let script_path = pkg.dir.join(&script_rel);
        if !script_path.is_file() {
            return Err(PkgError::link(format!(
                "bin '{bin_name}' target missing: {}",
                script_path.display()
            )));
        }

        let link_path = bin_dir.join(bin_name);
        let link_target = relative_path(&script_path, &bin_dir).unwrap_or_else(|| script_path.clone());

        remove_existing(&link_path)?;
        create_file_link(&link_target, &link_path)?;
        make_executable(&script_path)?;

        debug!(
            name = %pkg.name,
            bin = %bin_name,
            link = %link_path.display(),
            target = %link_target.display(),
            "linked binary"
        );
        links.push(link_path);
    }

    Ok(links)
}

/// Normalize a package-relative path, rejecting absolute and escaping ones.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Remove a stale link, file, or directory at `path`, dangling links included.
fn remove_existing(path: &Path) -> Result<(), PkgError> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(());
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| PkgError::link(format!("failed to remove {}: {e}", path.display())))
}

fn create_file_link(target: &Path, link: &Path) -> Result<(), PkgError> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, link);

    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_file(target, link);

    #[cfg(not(any(unix, windows)))]
    let result = link
        .parent()
        .map_or(Ok(0), |dir| fs::copy(dir.join(target), link))
        .map(|_| ());

    result.map_err(|e| {
        PkgError::link(format!(
            "failed to link {} -> {}: {e}",
            link.display(),
            target.display()
        ))
    })
}

fn make_executable(path: &Path) -> Result<(), PkgError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
            PkgError::link(format!("failed to chmod {}: {e}", path.display()))
        })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
