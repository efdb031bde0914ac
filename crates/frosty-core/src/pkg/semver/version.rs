//! Explicit version parsing and ordering.

use super::SemverError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Characters that belong to range syntax and never appear in an explicit version.
const RANGE_CHARS: &[char] = &['~', '^', 'x', 'X', '*', '<', '>', '=', '|'];

/// A parsed `major.minor.patch[-prerelease]` version.
///
/// Build metadata (`+...`) on a release is accepted and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Empty for a normal release.
    pub prerelease: String,
}

/// Scanner position while reading a version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Major,
    Minor,
    Patch,
    Prerelease,
}

impl Version {
    /// Create a release version.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: String::new(),
        }
    }

    /// Create a version carrying a prerelease tag.
    #[must_use]
    pub fn with_prerelease(major: u64, minor: u64, patch: u64, prerelease: &str) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: prerelease.to_string(),
        }
    }

    /// Returns true if this version carries a prerelease tag.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Parse an explicit version string.
    ///
    /// A single leading `v`/`V` is ignored. Everything after the first `-`
    /// that follows the patch number is kept verbatim as the prerelease.
    ///
    /// # Errors
    /// Returns `SemverError::InvalidVersion` when a numeric segment is missing
    /// or malformed, or when range syntax (`~^xX*<>=|`) appears.
    pub fn parse(input: &str) -> Result<Self, SemverError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let invalid = |reason: &str| SemverError::invalid_version(input, reason);

        let mut numbers = [0u64; 3];
        let mut digits = [0usize; 3];
        let mut segment = Segment::Major;
        let mut prerelease_start = None;

        for (idx, c) in body.char_indices() {
            let slot = match segment {
                Segment::Major => 0,
                Segment::Minor => 1,
                Segment::Patch => 2,
                Segment::Prerelease => break,
            };

            if RANGE_CHARS.contains(&c) {
                return Err(invalid("range syntax is not allowed in a version"));
            }

            match (segment, c) {
                (_, '0'..='9') => {
                    let digit = u64::from(c as u8 - b'0');
                    numbers[slot] = numbers[slot]
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                        .ok_or_else(|| invalid("numeric segment overflows"))?;
                    digits[slot] += 1;
                }
                (Segment::Major | Segment::Minor, '.') => {
                    if digits[slot] == 0 {
                        return Err(invalid("empty numeric segment"));
                    }
                    segment = if segment == Segment::Major {
                        Segment::Minor
                    } else {
                        Segment::Patch
                    };
                }
                (Segment::Patch, '-') => {
                    if digits[slot] == 0 {
                        return Err(invalid("empty numeric segment"));
                    }
                    segment = Segment::Prerelease;
                    prerelease_start = Some(idx + 1);
                }
                (Segment::Patch, '+') => {
                    if digits[slot] == 0 {
                        return Err(invalid("empty numeric segment"));
                    }
                    return Ok(Self::new(numbers[0], numbers[1], numbers[2]));
                }
                _ => return Err(invalid("unexpected character")),
            }
        }

        match segment {
            Segment::Major | Segment::Minor => {
                Err(invalid("expected major.minor.patch"))
            }
            Segment::Patch if digits[2] == 0 => Err(invalid("empty numeric segment")),
            Segment::Patch => Ok(Self::new(numbers[0], numbers[1], numbers[2])),
            Segment::Prerelease => {
                let prerelease = prerelease_start.map_or("", |start| &body[start..]);
                let prerelease = prerelease.split_once('+').map_or(prerelease, |(p, _)| p);
                if prerelease.is_empty() {
                    return Err(invalid("empty prerelease"));
                }
                Ok(Self::with_prerelease(
                    numbers[0], numbers[1], numbers[2], prerelease,
                ))
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| {
                match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.prerelease.cmp(&other.prerelease),
                }
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.is_prerelease() {
            write!(f, "-{}", self.prerelease)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
