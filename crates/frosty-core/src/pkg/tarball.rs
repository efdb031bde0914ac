//! Tarball download and extraction.

use super::error::PkgError;
use super::registry::RegistryClient;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, info};

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Leading path segments stripped from published archives (`package/`).
pub const REGISTRY_STRIP: usize = 1;

/// Download a tarball from a URL.
///
/// Goes through the registry client, so the auth header is only attached
/// when `url` targets the registry host, and transient failures are retried.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_tarball(
    client: &RegistryClient,
    url: &str,
    max_bytes: u64,
) -> Result<Bytes, PkgError> {
    info!(url = %url, "downloading tarball");
    let response = client.get(url).await?;

    if !response.status().is_success() {
        return Err(PkgError::network(
            url,
            format!("download failed with status {}", response.status()),
        ));
    }

    // Check content length if available
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::network(
                url,
                format!("tarball too large: {len} bytes (max: {max_bytes})"),
            ));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PkgError::network(url, format!("failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PkgError::network(
            url,
            format!("tarball too large: {} bytes (max: {max_bytes})", bytes.len()),
        ));
    }

    Ok(bytes)
}

/// Extract a gzip-compressed tar stream into `target`.
///
/// The first `strip` path segments of every entry are removed; entries that
/// are consumed entirely by stripping are skipped. Only directories and
/// regular files are accepted. On failure `target` is removed entirely.
///
/// Returns the number of files written.
///
/// # Errors
/// Returns an error if `target` is a regular file, the archive is corrupt,
/// or an entry is unsafe or of an unsupported type.
pub fn extract<R: Read>(reader: R, target: &Path, strip: usize) -> Result<usize, PkgError> {
    if target.is_file() {
        return Err(PkgError::extraction(target, "target exists and is a file"));
    }
    fs::create_dir_all(target)
        .map_err(|e| PkgError::extraction(target, format!("failed to create target: {e}")))?;

    match extract_entries(reader, target, strip) {
        Ok(files) => {
            debug!(target = %target.display(), files, "extracted archive");
            Ok(files)
        }
        Err(e) => {
            let _ = fs::remove_dir_all(target);
            Err(e)
        }
    }
}

fn extract_entries<R: Read>(reader: R, target: &Path, strip: usize) -> Result<usize, PkgError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut files = 0;

    let entries = archive
        .entries()
        .map_err(|e| PkgError::extraction(target, format!("failed to read entries: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| PkgError::extraction(target, format!("corrupt archive: {e}")))?;

        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::XHeader | EntryType::XGlobalHeader) {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| PkgError::extraction(target, format!("bad entry path: {e}")))?
            .into_owned();

        let Some(relative) = strip_path(&path, strip).map_err(|reason| {
            PkgError::extraction(target, format!("{reason}: {}", path.display()))
        })?
        else {
            continue;
        };
        let dest_path = target.join(&relative);

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&dest_path)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut file = File::create(&dest_path)?;
                io::copy(&mut entry, &mut file)?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Ok(mode) = entry.header().mode() {
                        let perms = fs::Permissions::from_mode((mode & 0o777) | 0o600);
                        let _ = fs::set_permissions(&dest_path, perms);
                    }
                }
                files += 1;
            }
            other => {
                return Err(PkgError::UnsupportedEntryType {
                    entry: path.display().to_string(),
                    kind: format!("{other:?}"),
                });
            }
        }
    }

    Ok(files)
}

/// Remove the first `strip` normal segments of `path`.
///
/// Returns `Ok(None)` when nothing remains. Absolute paths and `..`
/// segments are rejected.
fn strip_path(path: &Path, strip: usize) -> Result<Option<PathBuf>, &'static str> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err("archive contains path traversal"),
            Component::RootDir | Component::Prefix(_) => {
                return Err("archive contains absolute path")
            }
        }
    }

    if parts.len() <= strip {
        return Ok(None);
    }
    Ok(Some(parts[strip..].iter().collect()))
}
