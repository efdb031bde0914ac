//! Per-module cache index.
//!
//! Maps the exact specifier string a module was requested with to the
//! directory holding the materialized package. Lookups never evaluate
//! ranges: `1.0.0` and `~1.0.0` are unrelated keys.
//!
//! On disk every module has its own file under the index root,
//! `<name>.json` or `<scope>/<name>.json`, shaped as
//! `{"file": <path>, "index": {<specifier>: <path>}}`.

use crate::pkg::error::PkgError;
use frosty_util::fs::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const INDEX_EXT: &str = "json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModuleIndexFile {
    file: PathBuf,
    index: BTreeMap<String, PathBuf>,
}

/// Index entries for one module name.
#[derive(Debug, Clone)]
pub struct ModuleIndex {
    file: PathBuf,
    entries: BTreeMap<String, PathBuf>,
    dirty: bool,
}

impl ModuleIndex {
    fn empty(file: PathBuf) -> Self {
        Self {
            file,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load from `file`; a missing or unreadable file yields an empty index.
    fn load(file: PathBuf) -> Self {
        let parsed = fs::read_to_string(&file)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<ModuleIndexFile>(&s).map_err(|e| e.to_string()));

        match parsed {
            Ok(contents) => Self {
                file,
                entries: contents.index,
                dirty: false,
            },
            Err(e) => {
                debug!(file = %file.display(), error = %e, "ignoring unreadable index file");
                Self::empty(file)
            }
        }
    }

    /// Path of the backing JSON file.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn get(&self, specifier: &str) -> Option<&Path> {
        self.entries.get(specifier).map(PathBuf::as_path)
    }

    pub fn add(&mut self, specifier: &str, dir: PathBuf) {
        self.entries.insert(specifier.to_string(), dir);
        self.dirty = true;
    }

    pub fn remove(&mut self, specifier: &str) -> Option<PathBuf> {
        let removed = self.entries.remove(specifier);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Iterate `(specifier, dir)` pairs in specifier order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    fn save(&mut self) -> Result<(), PkgError> {
        let contents = ModuleIndexFile {
            file: self.file.clone(),
            index: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&contents)
            .map_err(|e| PkgError::cache(format!("failed to serialize index: {e}")))?;
        atomic_write(&self.file, &json).map_err(|e| {
            PkgError::cache(format!("failed to write {}: {e}", self.file.display()))
        })?;
        self.dirty = false;
        Ok(())
    }
}

/// All module indexes under one root directory.
#[derive(Debug, Clone)]
pub struct CacheIndex {
    root: PathBuf,
    modules: BTreeMap<String, ModuleIndex>,
}

impl CacheIndex {
    /// Eagerly load every index file under `root`.
    ///
    /// Files directly under `root` and one level of `@scope` directories are
    /// read. A missing root yields an empty index.
    #[must_use]
    pub fn load(root: &Path) -> Self {
        let mut modules = BTreeMap::new();

        let Ok(entries) = fs::read_dir(root) else {
            return Self {
                root: root.to_path_buf(),
                modules,
            };
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();

            if path.is_dir() {
                if !file_name.starts_with('@') {
                    continue;
                }
                let Ok(scoped) = fs::read_dir(&path) else {
                    continue;
                };
                for scoped_entry in scoped.flatten() {
                    let scoped_path = scoped_entry.path();
                    if let Some(stem) = index_stem(&scoped_path) {
                        let name = format!("{file_name}/{stem}");
                        modules.insert(name, ModuleIndex::load(scoped_path));
                    }
                }
            } else if let Some(stem) = index_stem(&path) {
                modules.insert(stem, ModuleIndex::load(path));
            }
        }

        debug!(root = %root.display(), modules = modules.len(), "loaded cache index");
        Self {
            root: root.to_path_buf(),
            modules,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index file path for a module name.
    #[must_use]
    pub fn index_file(root: &Path, name: &str) -> PathBuf {
        match name.split_once('/') {
            Some((scope, rest)) if name.starts_with('@') => {
                root.join(scope).join(format!("{rest}.{INDEX_EXT}"))
            }
            _ => root.join(format!("{name}.{INDEX_EXT}")),
        }
    }

    /// Exact-match lookup; `None` is a cache miss.
    #[must_use]
    pub fn lookup(&self, name: &str, specifier: &str) -> Option<&Path> {
        self.module(name)?.get(specifier)
    }

    /// Record `(name, specifier) -> dir`, overwriting any previous entry.
    ///
    /// Nothing is written until [`CacheIndex::commit`].
    pub fn add(&mut self, name: &str, specifier: &str, dir: PathBuf) {
        let root = &self.root;
        self.modules
            .entry(name.to_string())
            .or_insert_with(|| ModuleIndex::empty(Self::index_file(root, name)))
            .add(specifier, dir);
    }

    /// Drop a stale entry.
    pub fn remove(&mut self, name: &str, specifier: &str) -> Option<PathBuf> {
        self.modules.get_mut(name)?.remove(specifier)
    }

    /// Get the index for one module.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleIndex> {
        self.modules.get(name)
    }

    /// Iterate `(name, index)` pairs in name order.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &ModuleIndex)> {
        self.modules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Write every modified module index to disk.
    ///
    /// Each file is written atomically. A failure does not roll back files
    /// already written; the failed modules stay modified so a later commit
    /// retries them.
    ///
    /// # Errors
    /// Returns the first write error after attempting every module.
    pub fn commit(&mut self) -> Result<(), PkgError> {
        let mut first_error = None;
        let mut written = 0;

        for (name, module) in self.modules.iter_mut().filter(|(_, m)| m.dirty) {
            match module.save() {
                Ok(()) => written += 1,
                Err(e) => {
                    debug!(name = %name, error = %e, "failed to write index");
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(root = %self.root.display(), written, "committed cache index");
        first_error.map_or(Ok(()), Err)
    }
}

fn index_stem(path: &Path) -> Option<String> {
    if !path.is_file() || path.extension()? != INDEX_EXT {
        return None;
    }
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_independent_specifier_keys() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::load(dir.path());

        index.add("m", "1.0.0", PathBuf::from("/a"));
        index.add("m", "~1.0.x", PathBuf::from("/b"));

        assert_eq!(index.lookup("m", "1.0.0"), Some(Path::new("/a")));
        assert_eq!(index.lookup("m", "~1.0.x"), Some(Path::new("/b")));
        assert_eq!(index.lookup("m", "^1.0.0"), None);
        assert_eq!(index.lookup("other", "1.0.0"), None);
    }

    #[test]
    fn test_add_overwrites() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::load(dir.path());

        index.add("m", "1.0.0", PathBuf::from("/a"));
        index.add("m", "1.0.0", PathBuf::from("/c"));
        assert_eq!(index.lookup("m", "1.0.0"), Some(Path::new("/c")));
    }

    #[test]
    fn test_nothing_written_before_commit() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::load(dir.path());
        index.add("m", "1.0.0", PathBuf::from("/a"));

        assert!(!dir.path().join("m.json").exists());
    }

    #[test]
    fn test_commit_reload_cycle() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache").join("index");

        let mut index = CacheIndex::load(&root);
        index.add("lodash", "^4.0.0", PathBuf::from("/cache/lodash/4.17.21"));
        index.add("@types/node", "20.1.0", PathBuf::from("/cache/@types/node/20.1.0"));
        index.commit().unwrap();

        assert!(root.join("lodash.json").is_file());
        assert!(root.join("@types").join("node.json").is_file());

        let reloaded = CacheIndex::load(&root);
        assert_eq!(
            reloaded.lookup("lodash", "^4.0.0"),
            Some(Path::new("/cache/lodash/4.17.21"))
        );
        assert_eq!(
            reloaded.lookup("@types/node", "20.1.0"),
            Some(Path::new("/cache/@types/node/20.1.0"))
        );
    }

    #[test]
    fn test_file_format() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::load(dir.path());
        index.add("m", "1.0.0", PathBuf::from("/a"));
        index.commit().unwrap();

        let file = dir.path().join("m.json");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(json["file"], serde_json::json!(file));
        assert_eq!(json["index"]["1.0.0"], "/a");
    }

    #[test]
    fn test_unreadable_file_is_empty_module() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let index = CacheIndex::load(dir.path());
        assert!(index.module("broken").is_some());
        assert_eq!(index.lookup("broken", "1.0.0"), None);
        assert!(index.module("notes").is_none());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let index = CacheIndex::load(&dir.path().join("nope"));
        assert_eq!(index.modules().count(), 0);
    }

    #[test]
    fn test_index_file_paths() {
        let root = Path::new("/idx");
        assert_eq!(CacheIndex::index_file(root, "left-pad"), PathBuf::from("/idx/left-pad.json"));
        assert_eq!(
            CacheIndex::index_file(root, "@babel/core"),
            PathBuf::from("/idx/@babel/core.json")
        );
    }

    #[test]
    fn test_remove_entry() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::load(dir.path());
        index.add("m", "1.0.0", PathBuf::from("/a"));
        index.commit().unwrap();

        assert_eq!(index.remove("m", "1.0.0"), Some(PathBuf::from("/a")));
        index.commit().unwrap();

        let reloaded = CacheIndex::load(dir.path());
        assert_eq!(reloaded.lookup("m", "1.0.0"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_failure_keeps_other_modules() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("index");
        fs::create_dir_all(root.join("@locked")).unwrap();
        fs::set_permissions(root.join("@locked"), fs::Permissions::from_mode(0o500)).unwrap();

        let mut index = CacheIndex::load(&root);
        index.add("@locked/pkg", "1.0.0", PathBuf::from("/x"));
        index.add("free", "1.0.0", PathBuf::from("/y"));

        let result = index.commit();
        fs::set_permissions(root.join("@locked"), fs::Permissions::from_mode(0o755)).unwrap();

        // Root may bypass permission checks; only assert when the write failed.
        if result.is_err() {
            assert!(root.join("free.json").exists());
            index.commit().unwrap();
        }
        assert!(CacheIndex::load(&root).lookup("@locked/pkg", "1.0.0").is_some());
    }
}
