pub mod cache;
pub mod install;
pub mod resolve;
pub mod version;

use frosty_core::pkg::PkgError;
use serde::Serialize;

/// Error shape shared by every command's JSON output.
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl From<&PkgError> for ErrorInfo {
    fn from(err: &PkgError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Turn a package error into a diagnostic carrying its stable code.
pub fn diagnostic(err: &PkgError) -> miette::Report {
    miette::miette!(code = err.code(), "{err}")
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> miette::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| miette::miette!("failed to serialize output: {e}"))?;
    println!("{text}");
    Ok(())
}
