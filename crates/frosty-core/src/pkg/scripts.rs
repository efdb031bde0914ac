//! Lifecycle script execution.

use super::error::PkgError;
use super::package::Package;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Scripts run after a fresh install, in this order.
pub const LIFECYCLE_ORDER: [LifecycleScript; 2] =
    [LifecycleScript::Install, LifecycleScript::Postinstall];

/// A lifecycle script name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleScript {
    Install,
    Postinstall,
}

impl LifecycleScript {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Postinstall => "postinstall",
        }
    }

    fn command(self, pkg: &Package) -> Option<&str> {
        match self {
            Self::Install => pkg.install_script.as_deref(),
            Self::Postinstall => pkg.postinstall_script.as_deref(),
        }
    }
}

/// Run one lifecycle script of `pkg`, if it declares it.
///
/// The script runs through `sh -c` (`cmd /C` on Windows, or `shell -c` when
/// given) inside the package directory, with `<pkg>/node_modules/.bin`
/// prepended to `PATH` and `npm_package_name`/`npm_package_version` set.
///
/// Returns whether a script ran.
///
/// # Errors
/// Returns `PkgError::ScriptExecution` with the combined output if the script
/// cannot be spawned or exits non-zero.
pub async fn run_script(
    pkg: &Package,
    script: LifecycleScript,
    shell: Option<&str>,
) -> Result<bool, PkgError> {
    let Some(command) = script.command(pkg) else {
        return Ok(false);
    };

    info!(
        name = %pkg.name,
        script = script.as_str(),
        command = %command,
        "running lifecycle script"
    );

    let mut cmd = shell_command(shell, command);
    cmd.current_dir(&pkg.dir)
        .env("PATH", script_path(pkg))
        .env("npm_package_name", &pkg.name)
        .env("npm_package_version", &pkg.version)
        .env("npm_lifecycle_event", script.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let failure = |status: String, output: String| PkgError::ScriptExecution {
        script: script.as_str().to_string(),
        command: command.to_string(),
        dir: pkg.dir.clone(),
        status,
        output,
    };

    let output = cmd
        .output()
        .await
        .map_err(|e| failure(format!("failed to spawn: {e}"), String::new()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        debug!(name = %pkg.name, script = script.as_str(), "lifecycle script finished");
        return Ok(true);
    }

    let status = output
        .status
        .code()
        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
    warn!(
        name = %pkg.name,
        script = script.as_str(),
        status = %status,
        output = %combined,
        "lifecycle script failed"
    );
    Err(failure(status, combined))
}

/// Run `install` then `postinstall`, stopping at the first failure.
///
/// # Errors
/// Returns the first script failure.
pub async fn run_lifecycle(pkg: &Package, shell: Option<&str>) -> Result<usize, PkgError> {
    let mut ran = 0;
    for script in LIFECYCLE_ORDER {
        if run_script(pkg, script, shell).await? {
            ran += 1;
        }
    }
    Ok(ran)
}

fn shell_command(shell: Option<&str>, script: &str) -> Command {
    match shell {
        Some(shell) => {
            let mut cmd = Command::new(shell);
            cmd.arg("-c").arg(script);
            cmd
        }
        None if cfg!(windows) => {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(script);
            cmd
        }
        None => {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd
        }
    }
}

/// `PATH` with the package's own `.bin` directory first.
fn script_path(pkg: &Package) -> OsString {
    let bin_dir = pkg.dir.join("node_modules").join(".bin");
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let mut paths: Vec<PathBuf> = vec![bin_dir];
    paths.extend(std::env::split_paths(&existing));
    std::env::join_paths(paths).unwrap_or(existing)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn package(dir: &Path, scripts: &str) -> Package {
        let json = format!(r#"{{"name": "demo", "version": "1.2.3", "scripts": {scripts}}}"#);
        fs::write(dir.join("package.json"), json).unwrap();
        Package::load(dir).unwrap()
    }

    #[tokio::test]
    async fn test_runs_in_package_dir_with_env() {
        let dir = tempdir().unwrap();
        let pkg = package(
            dir.path(),
            r#"{"install": "echo \"$npm_package_name@$npm_package_version\" > installed.txt"}"#,
        );

        assert!(run_script(&pkg, LifecycleScript::Install, None).await.unwrap());
        let out = fs::read_to_string(dir.path().join("installed.txt")).unwrap();
        assert_eq!(out.trim(), "demo@1.2.3");
    }

    #[tokio::test]
    async fn test_missing_script_is_noop() {
        let dir = tempdir().unwrap();
        let pkg = package(dir.path(), "{}");
        assert!(!run_script(&pkg, LifecycleScript::Postinstall, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_carries_output() {
        let dir = tempdir().unwrap();
        let pkg = package(dir.path(), r#"{"postinstall": "echo boom; echo bad >&2; exit 3"}"#);

        let err = run_script(&pkg, LifecycleScript::Postinstall, None)
            .await
            .unwrap_err();
        match err {
            PkgError::ScriptExecution {
                script,
                status,
                output,
                ..
            } => {
                assert_eq!(script, "postinstall");
                assert_eq!(status, "exit code 3");
                assert!(output.contains("boom"));
                assert!(output.contains("bad"));
            }
            other => panic!("expected ScriptExecution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_bin_on_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let bin_dir = dir.path().join("node_modules").join(".bin");
        fs::create_dir_all(&bin_dir).unwrap();
        let tool = bin_dir.join("frosty-test-tool");
        fs::write(&tool, "#!/bin/sh\necho from-local-bin > tool.txt\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let pkg = package(dir.path(), r#"{"install": "frosty-test-tool"}"#);
        run_script(&pkg, LifecycleScript::Install, None).await.unwrap();
        assert!(dir.path().join("tool.txt").exists());
    }

    #[tokio::test]
    async fn test_dropped_script_is_killed() {
        let dir = tempdir().unwrap();
        let pkg = package(dir.path(), r#"{"install": "sleep 1; echo ran > late.txt"}"#);

        let run = run_script(&pkg, LifecycleScript::Install, None);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), run).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let dir = tempdir().unwrap();
        let pkg = package(
            dir.path(),
            r#"{"install": "echo install >> order.txt", "postinstall": "echo postinstall >> order.txt"}"#,
        );

        assert_eq!(run_lifecycle(&pkg, None).await.unwrap(), 2);
        let order = fs::read_to_string(dir.path().join("order.txt")).unwrap();
        assert_eq!(order, "install\npostinstall\n");
    }
}
