//! Semantic version engine.
//!
//! Parses explicit versions and npm-style ranges (`~`, `^`, `x`/`*`,
//! partial versions, `||`), evaluates satisfaction, and picks the best
//! candidate from a published version list.
//!
//! Caret ranges always bump the major component, including `0.x` versions.

mod range;
mod version;

pub use range::{transition, Action, CharClass, Constraint, ConstraintSet, Op, Range, ScanState};
pub use version::Version;

use thiserror::Error;

/// Version engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("invalid range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("no version satisfies '{range}' (candidates: {})", .candidates.join(", "))]
    NoMatch {
        range: String,
        candidates: Vec<String>,
    },
}

impl SemverError {
    pub(crate) fn invalid_version(input: &str, reason: &str) -> Self {
        Self::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_range(input: &str, reason: &str) -> Self {
        Self::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Returns true if `version` satisfies `range`.
///
/// # Errors
/// Returns an error if either string fails to parse.
pub fn satisfies(version: &str, range: &str) -> Result<bool, SemverError> {
    let version = Version::parse(version)?;
    let range = Range::parse(range)?;
    Ok(range.satisfies(&version))
}

/// Pick the highest candidate that satisfies `range`.
///
/// Every candidate must parse; one bad version string fails the whole call.
///
/// # Errors
/// Returns a parse error, or `SemverError::NoMatch` carrying the range and
/// the candidate list when nothing satisfies it.
pub fn select_best_match<S: AsRef<str>>(
    range: &str,
    candidates: &[S],
) -> Result<Version, SemverError> {
    let parsed_range = Range::parse(range)?;

    let mut versions = candidates
        .iter()
        .map(|c| Version::parse(c.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    versions.sort_by(|a, b| b.cmp(a));

    versions
        .into_iter()
        .find(|v| parsed_range.satisfies(v))
        .ok_or_else(|| SemverError::NoMatch {
            range: range.to_string(),
            candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        })
}

/// Fill wildcard or missing components of a version with zeros.
///
/// `"1"` and `"1.x"` become `1.0.0`, `"*"` becomes `0.0.0`.
///
/// # Errors
/// Returns an error if the input is not a (possibly partial) version.
pub fn pad_version(input: &str) -> Result<Version, SemverError> {
    let range = Range::parse(&format!(">={}", input.trim()))?;
    range
        .sets()
        .first()
        .and_then(|set| set.constraints().first())
        .map(|c| c.version.clone())
        .ok_or_else(|| SemverError::invalid_version(input, "empty version"))
}
