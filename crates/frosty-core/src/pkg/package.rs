//! `package.json` descriptor.
//!
//! The manifest is read once into [`Package`], with the loosely-typed
//! `bin` and `dependencies` fields normalized to plain maps. Unknown fields
//! are kept so a save writes them back unchanged.

use super::error::PkgError;
use frosty_util::fs::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Manifest file name.
pub const PACKAGE_JSON: &str = "package.json";

/// `bin` as written: a single path, a name-to-path map, or junk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    Path(String),
    Map(BTreeMap<String, serde_json::Value>),
    Other(serde_json::Value),
}

/// A dependency map as written; anything that is not an object is tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyField {
    Map(BTreeMap<String, serde_json::Value>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Scripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    install: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    postinstall: Option<String>,
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "_resolved", default, skip_serializing_if = "Option::is_none")]
    resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scripts: Option<Scripts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bin: Option<BinField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependencies: Option<DependencyField>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// A loaded package descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// URL the package was downloaded from (`_resolved`).
    pub resolved: Option<String>,
    pub install_script: Option<String>,
    pub postinstall_script: Option<String>,
    /// Bin name to path relative to the package directory.
    pub bin: BTreeMap<String, String>,
    /// Dependency name to specifier.
    pub dependencies: BTreeMap<String, String>,
    /// Directory containing the manifest.
    pub dir: PathBuf,
    manifest: Manifest,
    dirty: bool,
}

impl Package {
    /// Load `<dir>/package.json`.
    ///
    /// # Errors
    /// Returns an error if the file is missing or not a JSON object.
    pub fn load(dir: &Path) -> Result<Self, PkgError> {
        let path = dir.join(PACKAGE_JSON);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PkgError::package_json(&path, e.to_string()))?;
        Self::parse(dir, &content)
    }

    /// Parse manifest text as if it lived in `dir`.
    ///
    /// # Errors
    /// Returns an error if `content` is not a JSON object.
    pub fn parse(dir: &Path, content: &str) -> Result<Self, PkgError> {
        let manifest: Manifest = serde_json::from_str(content)
            .map_err(|e| PkgError::package_json(dir.join(PACKAGE_JSON), e.to_string()))?;

        let name = manifest.name.clone().unwrap_or_default();
        let bin = manifest
            .bin
            .as_ref()
            .map(|b| normalize_bin(&name, b))
            .unwrap_or_default();
        let scripts = manifest.scripts.clone().unwrap_or_default();

        Ok(Self {
            version: manifest.version.clone().unwrap_or_default(),
            resolved: manifest.resolved.clone(),
            install_script: non_empty(scripts.install),
            postinstall_script: non_empty(scripts.postinstall),
            bin,
            dependencies: normalize_deps(manifest.dependencies.as_ref()),
            dir: dir.to_path_buf(),
            name,
            manifest,
            dirty: false,
        })
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(PACKAGE_JSON)
    }

    /// Record the download URL; marks the manifest modified if it changed.
    pub fn set_resolved(&mut self, url: &str) {
        if self.resolved.as_deref() != Some(url) {
            self.resolved = Some(url.to_string());
            self.manifest.resolved = Some(url.to_string());
            self.dirty = true;
        }
    }

    /// Write the manifest back if it was modified.
    ///
    /// Returns whether a write happened.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&mut self) -> Result<bool, PkgError> {
        if !self.dirty {
            return Ok(false);
        }
        let path = self.manifest_path();
        let mut json = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|e| PkgError::package_json(&path, e.to_string()))?;
        json.push(b'\n');
        atomic_write(&path, &json).map_err(|e| PkgError::package_json(&path, e.to_string()))?;
        self.dirty = false;
        Ok(true)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// A bare `bin` path is named after the package (without its scope).
fn normalize_bin(name: &str, bin: &BinField) -> BTreeMap<String, String> {
    match bin {
        BinField::Path(path) if !name.is_empty() => {
            let bin_name = name.rsplit('/').next().unwrap_or(name);
            BTreeMap::from([(bin_name.to_string(), path.clone())])
        }
        BinField::Map(map) => string_entries(map),
        BinField::Path(_) | BinField::Other(_) => BTreeMap::new(),
    }
}

fn normalize_deps(deps: Option<&DependencyField>) -> BTreeMap<String, String> {
    match deps {
        Some(DependencyField::Map(map)) => string_entries(map),
        Some(DependencyField::Other(_)) | None => BTreeMap::new(),
    }
}

fn string_entries(map: &BTreeMap<String, serde_json::Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn parse(json: &str) -> Package {
        Package::parse(Path::new("/pkg"), json).unwrap()
    }

    #[test]
    fn test_basic_fields() {
        let pkg = parse(
            r#"{
                "name": "left-pad",
                "version": "1.3.0",
                "_resolved": "http://r/left-pad/-/left-pad-1.3.0.tgz",
                "scripts": {"install": "node build.js", "postinstall": "node post.js", "test": "x"},
                "dependencies": {"a": "^1.0.0", "b": "~2.0.0"}
            }"#,
        );
        assert_eq!(pkg.name, "left-pad");
        assert_eq!(pkg.version, "1.3.0");
        assert_eq!(pkg.resolved.as_deref(), Some("http://r/left-pad/-/left-pad-1.3.0.tgz"));
        assert_eq!(pkg.install_script.as_deref(), Some("node build.js"));
        assert_eq!(pkg.postinstall_script.as_deref(), Some("node post.js"));
        assert_eq!(pkg.dependencies.len(), 2);
        assert_eq!(pkg.dependencies["a"], "^1.0.0");
        assert_eq!(pkg.dir, PathBuf::from("/pkg"));
    }

    #[test]
    fn test_bin_string_uses_package_name() {
        let pkg = parse(r#"{"name": "mkdirp", "bin": "./bin/cmd.js"}"#);
        assert_eq!(pkg.bin.len(), 1);
        assert_eq!(pkg.bin["mkdirp"], "./bin/cmd.js");

        let scoped = parse(r#"{"name": "@scope/tool", "bin": "cli.js"}"#);
        assert_eq!(scoped.bin["tool"], "cli.js");
    }

    #[test]
    fn test_bin_map() {
        let pkg = parse(r#"{"name": "x", "bin": {"a": "bin/a.js", "b": "bin/b.js", "bad": 3}}"#);
        assert_eq!(pkg.bin.len(), 2);
        assert_eq!(pkg.bin["b"], "bin/b.js");
    }

    #[test]
    fn test_malformed_fields_are_tolerated() {
        let pkg = parse(r#"{"name": "x", "bin": 42, "dependencies": ["a", "b"], "devDependencies": "nope"}"#);
        assert!(pkg.bin.is_empty());
        assert!(pkg.dependencies.is_empty());
    }

    #[test]
    fn test_empty_scripts_ignored() {
        let pkg = parse(r#"{"scripts": {"install": "  "}}"#);
        assert_eq!(pkg.install_script, None);
        assert_eq!(pkg.name, "");
    }

    #[test]
    fn test_invalid_json() {
        let err = Package::parse(Path::new("/pkg"), "[1, 2]").unwrap_err();
        assert!(matches!(err, PkgError::PackageJson { .. }));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Package::load(dir.path()),
            Err(PkgError::PackageJson { .. })
        ));
    }

    #[test]
    fn test_save_only_when_resolved_changes() {
        let dir = tempdir().unwrap();
        let original = r#"{"name":"a","version":"1.0.0","main":"index.js","dependencies":["weird"]}"#;
        fs::write(dir.path().join(PACKAGE_JSON), original).unwrap();

        let mut pkg = Package::load(dir.path()).unwrap();
        assert!(!pkg.save().unwrap());
        assert_eq!(fs::read_to_string(dir.path().join(PACKAGE_JSON)).unwrap(), original);

        pkg.set_resolved("http://r/a/-/a-1.0.0.tgz");
        assert!(pkg.save().unwrap());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(PACKAGE_JSON)).unwrap())
                .unwrap();
        assert_eq!(json["_resolved"], "http://r/a/-/a-1.0.0.tgz");
        assert_eq!(json["main"], "index.js");
        assert_eq!(json["dependencies"], serde_json::json!(["weird"]));

        pkg.set_resolved("http://r/a/-/a-1.0.0.tgz");
        assert!(!pkg.save().unwrap());
    }
}
