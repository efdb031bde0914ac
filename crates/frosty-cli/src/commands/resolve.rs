use super::{diagnostic, print_json, ErrorInfo};
use frosty_core::pkg::RegistryClient;
use frosty_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

/// Resolve result for JSON output.
#[derive(Serialize)]
struct ResolveResult {
    ok: bool,
    name: String,
    range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

/// Print the version `range` selects for `name` and its tarball URL.
pub fn run(config: &Config, name: &str, range: Option<&str>, json: bool) -> Result<()> {
    let range = range.unwrap_or("latest");
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(async {
        let client = RegistryClient::from_config(config)?;
        client.resolve(name, range).await
    });

    match result {
        Ok(resolved) => {
            let version = resolved.version.to_string();
            if json {
                return print_json(&ResolveResult {
                    ok: true,
                    name: name.to_string(),
                    range: range.to_string(),
                    version: Some(version),
                    url: Some(resolved.url),
                    error: None,
                });
            }
            println!("{name}@{version}");
            println!("{}", resolved.url);
            Ok(())
        }
        Err(err) if json => {
            print_json(&ResolveResult {
                ok: false,
                name: name.to_string(),
                range: range.to_string(),
                version: None,
                url: None,
                error: Some(ErrorInfo::from(&err)),
            })?;
            std::process::exit(2);
        }
        Err(err) => Err(diagnostic(&err)),
    }
}
