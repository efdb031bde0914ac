use super::{diagnostic, print_json, ErrorInfo};
use frosty_core::pkg::{InstallFailure, InstallOrigin, InstallReport, InstalledModule, Installer};
use frosty_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Arguments of `frosty install`.
#[derive(clap::Args, Debug, Default)]
pub struct InstallArgs {
    /// Keep installing other dependencies after a failure
    #[arg(long)]
    pub force: bool,

    /// Home directory holding the module cache (defaults to $FROSTY_HOME or ~/.frosty)
    #[arg(long, value_name = "PATH")]
    pub frosty_home: Option<PathBuf>,

    /// Path to a frosty.json project config
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum number of dependencies installed at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// Install result for JSON output.
#[derive(Serialize)]
struct InstallResult {
    ok: bool,
    installed: Vec<InstalledModule>,
    skipped: usize,
    failures: Vec<InstallFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

/// Run `frosty install` in `config.cwd`.
pub fn run(config: Config, args: InstallArgs, json: bool) -> Result<()> {
    let config = build_config(config, args).into_diagnostic()?;
    info!(
        cwd = %config.cwd.display(),
        registry = %config.registry_url,
        home = %config.frosty_home.display(),
        "INSTALL command invoked"
    );

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(async {
        let installer = Installer::from_config(&config)?;
        installer.install_project(&config.cwd).await
    });

    match result {
        Ok(report) => {
            let ok = report.is_success();
            if json {
                print_json(&InstallResult {
                    ok,
                    installed: report.installed,
                    skipped: report.skipped,
                    failures: report.failures,
                    error: None,
                })?;
            } else {
                print_report(&report);
            }
            if !ok {
                std::process::exit(2);
            }
            Ok(())
        }
        Err(err) if json => {
            print_json(&InstallResult {
                ok: false,
                installed: Vec::new(),
                skipped: 0,
                failures: Vec::new(),
                error: Some(ErrorInfo::from(&err)),
            })?;
            std::process::exit(2);
        }
        Err(err) => Err(diagnostic(&err)),
    }
}

/// Layer CLI flags over the environment and `frosty.json`.
///
/// Flags win over the project config.
fn build_config(
    mut config: Config,
    args: InstallArgs,
) -> Result<Config, frosty_core::Error> {
    if let Some(home) = args.frosty_home {
        config = config.with_frosty_home(home);
    }
    let mut config = config
        .with_force(args.force)
        .with_config_path(args.config)
        .load_project_config()?;
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    Ok(config)
}

fn print_report(report: &InstallReport) {
    for module in &report.installed {
        let origin = match module.origin {
            InstallOrigin::Network => "network",
            InstallOrigin::Cache => "cache",
            InstallOrigin::Local => "local",
        };
        println!("+ {}@{} ({origin})", module.name, module.version);
    }
    if report.skipped > 0 {
        println!("({} already present)", report.skipped);
    }
    if report.installed.is_empty() && report.skipped == 0 && report.failures.is_empty() {
        println!("No dependencies to install");
    }
    for failure in &report.failures {
        eprintln!(
            "! {}@{}: {} {}",
            failure.name, failure.specifier, failure.code, failure.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_flags_override_project_config() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("frosty.json"),
            r#"{"concurrency": 3, "registry": "http://mirror.test", "mirrors": ["http://m2.test"]}"#,
        )
        .unwrap();

        let config = Config::new(dir.path().to_path_buf()).with_frosty_home(dir.path().join("home"));
        let args = InstallArgs {
            force: true,
            concurrency: Some(5),
            ..InstallArgs::default()
        };
        let config = build_config(config, args).unwrap();

        assert!(config.force);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.registry_url, "http://mirror.test");
        assert_eq!(config.mirrors, vec!["http://m2.test"]);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf()).with_frosty_home(dir.path().join("home"));
        let args = InstallArgs {
            config: Some(dir.path().join("missing.json")),
            ..InstallArgs::default()
        };
        assert!(build_config(config, args).is_err());
    }

    #[test]
    fn test_home_flag_used_for_config_discovery() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("frosty.json"), r#"{"scriptShell": "bash"}"#).unwrap();

        let config = Config::new(dir.path().join("project"));
        let args = InstallArgs {
            frosty_home: Some(home.clone()),
            ..InstallArgs::default()
        };
        let config = build_config(config, args).unwrap();
        assert_eq!(config.frosty_home, home);
        assert_eq!(config.script_shell.as_deref(), Some("bash"));
    }
}
