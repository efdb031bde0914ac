use crate::error::Error;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default number of sibling dependencies installed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Runtime configuration for frosty.
///
/// Built once per invocation and passed by reference to every component.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory (the project being installed).
    pub cwd: PathBuf,

    /// Home directory holding the cache.
    pub frosty_home: PathBuf,

    /// Registry root URL.
    pub registry_url: String,

    /// Bearer token sent to the registry host only.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,

    /// Continue past failures in sibling branches.
    pub force: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Maximum sibling installs in flight.
    pub concurrency: usize,

    /// Explicit `frosty.json` path, if given.
    pub config_path: Option<PathBuf>,

    /// Mirror registry roots tried after the primary registry.
    pub mirrors: Vec<String>,

    /// Shell used for lifecycle scripts instead of the platform default.
    pub script_shell: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("cwd", &self.cwd)
            .field("frosty_home", &self.frosty_home)
            .field("registry_url", &self.registry_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("force", &self.force)
            .field("verbosity", &self.verbosity)
            .field("json_logs", &self.json_logs)
            .field("concurrency", &self.concurrency)
            .field("config_path", &self.config_path)
            .field("mirrors", &self.mirrors)
            .field("script_shell", &self.script_shell)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            frosty_home: PathBuf::from(".frosty"),
            registry_url: paths::DEFAULT_REGISTRY.to_string(),
            auth_token: None,
            force: false,
            verbosity: 0,
            json_logs: false,
            concurrency: DEFAULT_CONCURRENCY,
            config_path: None,
            mirrors: Vec::new(),
            script_shell: None,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Create a config for `cwd` from `FROSTY_HOME`, `NPM_REGISTRY_URL` and `NPM_TOKEN`.
    #[must_use]
    pub fn from_env(cwd: PathBuf) -> Self {
        Self {
            cwd,
            frosty_home: paths::frosty_home(),
            registry_url: paths::registry_url(),
            auth_token: paths::auth_token(),
            ..Default::default()
        }
    }

    /// Set the home directory.
    #[must_use]
    pub fn with_frosty_home(mut self, home: PathBuf) -> Self {
        self.frosty_home = home;
        self
    }

    /// Set the registry root URL.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set the registry auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Set force mode.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set install concurrency. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set an explicit `frosty.json` path.
    #[must_use]
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Set mirror registry roots.
    #[must_use]
    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Overlay values from a project configuration file.
    #[must_use]
    pub fn with_project_config(mut self, project: ProjectConfig) -> Self {
        if let Some(registry) = project.registry {
            self.registry_url = registry;
        }
        if let Some(concurrency) = project.concurrency {
            self.concurrency = concurrency.max(1);
        }
        if !project.mirrors.is_empty() {
            self.mirrors = project.mirrors;
        }
        if project.script_shell.is_some() {
            self.script_shell = project.script_shell;
        }
        self
    }

    /// Load `frosty.json` (see [`ProjectConfig::discover`]) and overlay it.
    ///
    /// # Errors
    /// Returns an error only when an explicit `config_path` cannot be read or parsed.
    pub fn load_project_config(self) -> Result<Self, Error> {
        match ProjectConfig::discover(self.config_path.as_deref(), &self.cwd, &self.frosty_home)? {
            Some((path, project)) => {
                debug!(path = %path.display(), "loaded project config");
                Ok(self.with_project_config(project))
            }
            None => Ok(self),
        }
    }

    /// Directory holding copied package trees.
    #[must_use]
    pub fn cache_modules_dir(&self) -> PathBuf {
        paths::cache_modules_dir(&self.frosty_home)
    }

    /// Directory holding per-module index files.
    #[must_use]
    pub fn cache_index_dir(&self) -> PathBuf {
        paths::cache_index_dir(&self.frosty_home)
    }
}

/// Contents of `frosty.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub registry: Option<String>,
    pub concurrency: Option<usize>,
    pub mirrors: Vec<String>,
    pub script_shell: Option<String>,
}

impl ProjectConfig {
    /// Parse a project config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find the first usable `frosty.json`.
    ///
    /// Search order: `explicit`, `<cwd>/frosty.json`, `<home>/frosty.json`.
    /// Implicit candidates that are missing or unparsable are skipped.
    ///
    /// # Errors
    /// Returns an error if `explicit` is given and cannot be loaded.
    pub fn discover(
        explicit: Option<&Path>,
        cwd: &Path,
        home: &Path,
    ) -> Result<Option<(PathBuf, Self)>, Error> {
        if let Some(path) = explicit {
            return Self::load(path).map(|config| Some((path.to_path_buf(), config)));
        }

        for candidate in [cwd.join(paths::CONFIG_FILE), home.join(paths::CONFIG_FILE)] {
            if !candidate.is_file() {
                continue;
            }
            match Self::load(&candidate) {
                Ok(config) => return Ok(Some((candidate, config))),
                Err(e) => debug!(path = %candidate.display(), error = %e, "skipping config"),
            }
        }

        Ok(None)
    }
}
