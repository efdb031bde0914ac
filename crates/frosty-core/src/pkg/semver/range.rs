//! npm-style range expressions.
//!
//! A [`Range`] is an OR of [`ConstraintSet`]s; a set is an AND of
//! [`Constraint`]s. Parsing is a single left-to-right scan driven by
//! [`ScanState`] and the [`transition`] table.

use super::version::Version;
use super::SemverError;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// `operator version`, e.g. `>=1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
}

impl Constraint {
    #[must_use]
    pub fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        match self.op {
            Op::Eq => version == &self.version,
            Op::Gt => version > &self.version,
            Op::Ge => version >= &self.version,
            Op::Lt => version < &self.version,
            Op::Le => version <= &self.version,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// Constraints that must all hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        self.constraints.iter().all(|c| c.satisfies(version))
    }

    fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, constraint) in self.constraints.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{constraint}")?;
        }
        Ok(())
    }
}

/// A parsed range: satisfied when any set is satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    sets: Vec<ConstraintSet>,
}

impl Range {
    /// Parse a range expression.
    ///
    /// # Errors
    /// Returns `SemverError::InvalidRange` for malformed input.
    pub fn parse(input: &str) -> Result<Self, SemverError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::any());
        }

        let mut scanner = Scanner::new(input);
        let mut state = ScanState::ScanningConstraint;

        for c in trimmed.chars().map(Some).chain(std::iter::once(None)) {
            let class = c.map_or(CharClass::End, CharClass::of);
            let (next, actions) = transition(state, class)
                .map_err(|reason| SemverError::invalid_range(input, reason))?;
            for action in actions {
                scanner.apply(*action, c)?;
            }
            state = next;
        }

        Ok(Self {
            sets: scanner.sets,
        })
    }

    /// The unbounded range `>=0.0.0`.
    #[must_use]
    pub fn any() -> Self {
        Self {
            sets: vec![ConstraintSet {
                constraints: vec![Constraint::new(Op::Ge, Version::default())],
            }],
        }
    }

    #[must_use]
    pub fn sets(&self) -> &[ConstraintSet] {
        &self.sets
    }

    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set.satisfies(version))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.sets.iter().enumerate() {
            if i > 0 {
                f.write_str("||")?;
            }
            write!(f, "{set}")?;
        }
        Ok(())
    }
}

impl FromStr for Range {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Scanner state while reading a range expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Expecting the start of a constraint (start of input or after `||`).
    ScanningConstraint,
    /// Reading operator characters (`<>=~^`), whitespace allowed.
    ScanningOperator,
    /// Reading a version body.
    ScanningVersionBody,
    /// A constraint just ended; either another constraint or `||` follows.
    AfterConstraint,
    /// Saw the first `|` of a set separator.
    ScanningSetSeparator,
}

/// Input classification fed to [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Whitespace,
    Operator,
    Pipe,
    Body,
    End,
    Other,
}

impl CharClass {
    #[must_use]
    pub fn of(c: char) -> Self {
        match c {
            c if c.is_whitespace() => Self::Whitespace,
            '<' | '>' | '=' | '~' | '^' => Self::Operator,
            '|' => Self::Pipe,
            c if c.is_ascii_alphanumeric() => Self::Body,
            '.' | '-' | '+' | '*' => Self::Body,
            _ => Self::Other,
        }
    }
}

/// Side effect performed by the scanner for one input character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    BeginOperator,
    ExtendOperator,
    BeginBody,
    ExtendBody,
    EndConstraint,
    EndSet,
    Finish,
}

/// The range scanner's transition table.
///
/// # Errors
/// Returns a short reason when `class` is not accepted in `state`.
pub fn transition(
    state: ScanState,
    class: CharClass,
) -> Result<(ScanState, &'static [Action]), &'static str> {
    use Action::{
        BeginBody, BeginOperator, EndConstraint, EndSet, ExtendBody, ExtendOperator, Finish, Skip,
    };
    use CharClass::{Body, End, Operator, Other, Pipe, Whitespace};
    use ScanState::{
        AfterConstraint, ScanningConstraint, ScanningOperator, ScanningSetSeparator,
        ScanningVersionBody,
    };

    match (state, class) {
        (_, Other) => Err("unexpected character"),

        (ScanningConstraint, Whitespace) => Ok((ScanningConstraint, &[Skip])),
        (ScanningConstraint, Operator) => Ok((ScanningOperator, &[BeginOperator])),
        (ScanningConstraint, Body) => Ok((ScanningVersionBody, &[BeginBody])),
        (ScanningConstraint, Pipe) => Err("empty constraint set"),
        (ScanningConstraint, End) => Ok((ScanningConstraint, &[Finish])),

        (ScanningOperator, Whitespace) => Ok((ScanningOperator, &[Skip])),
        (ScanningOperator, Operator) => Ok((ScanningOperator, &[ExtendOperator])),
        (ScanningOperator, Body) => Ok((ScanningVersionBody, &[BeginBody])),
        (ScanningOperator, Pipe | End) => Err("operator without a version"),

        (ScanningVersionBody, Body) => Ok((ScanningVersionBody, &[ExtendBody])),
        (ScanningVersionBody, Whitespace) => Ok((AfterConstraint, &[EndConstraint])),
        (ScanningVersionBody, Pipe) => Ok((ScanningSetSeparator, &[EndConstraint])),
        (ScanningVersionBody, End) => Ok((ScanningVersionBody, &[EndConstraint, EndSet])),
        (ScanningVersionBody, Operator) => Err("operator inside a version"),

        (AfterConstraint, Whitespace) => Ok((AfterConstraint, &[Skip])),
        (AfterConstraint, Operator) => Ok((ScanningOperator, &[BeginOperator])),
        (AfterConstraint, Body) => Ok((ScanningVersionBody, &[BeginBody])),
        (AfterConstraint, Pipe) => Ok((ScanningSetSeparator, &[Skip])),
        (AfterConstraint, End) => Ok((AfterConstraint, &[EndSet])),

        (ScanningSetSeparator, Pipe) => Ok((ScanningConstraint, &[EndSet])),
        (ScanningSetSeparator, _) => Err("malformed `||` separator"),
    }
}

/// How a constraint's version body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Bare,
    Explicit(Op),
    Tilde,
    Caret,
}

impl Modifier {
    fn parse(op: &str) -> Result<Self, &'static str> {
        match op {
            "" => Ok(Self::Bare),
            "=" => Ok(Self::Explicit(Op::Eq)),
            ">" => Ok(Self::Explicit(Op::Gt)),
            ">=" => Ok(Self::Explicit(Op::Ge)),
            "<" => Ok(Self::Explicit(Op::Lt)),
            "<=" => Ok(Self::Explicit(Op::Le)),
            "~" | "~>" => Ok(Self::Tilde),
            "^" => Ok(Self::Caret),
            s if s.contains(['~', '^']) => Err("conflicting range modifiers"),
            _ => Err("unknown operator"),
        }
    }
}

/// A version body with wildcard or omitted components.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartialVersion {
    /// Leading numeric components, at most three.
    parts: Vec<u64>,
    /// An `x`, `X`, or `*` component was written.
    wildcard: bool,
    prerelease: String,
}

impl PartialVersion {
    fn parse(body: &str) -> Result<Self, &'static str> {
        let body = body
            .strip_prefix('v')
            .or_else(|| body.strip_prefix('V'))
            .unwrap_or(body);
        let body = body.split_once('+').map_or(body, |(b, _)| b);
        let (main, prerelease) = match body.split_once('-') {
            Some((main, pre)) => (main, pre),
            None => (body, ""),
        };

        let mut parts = Vec::with_capacity(3);
        let mut wildcard = false;
        let mut count = 0;

        for component in main.split('.') {
            count += 1;
            if count > 3 {
                return Err("too many version components");
            }
            match component {
                "" => return Err("empty version component"),
                "x" | "X" | "*" => wildcard = true,
                digits if !wildcard => {
                    let n = digits
                        .parse::<u64>()
                        .map_err(|_| "invalid version component")?;
                    parts.push(n);
                }
                _ => {
                    // anything after a wildcard is treated as a wildcard too
                    if !component.chars().all(|c| c.is_ascii_digit()) {
                        return Err("invalid version component");
                    }
                }
            }
        }

        if prerelease.is_empty() && body.ends_with('-') {
            return Err("empty prerelease");
        }

        let prerelease = if parts.len() == 3 {
            prerelease.to_string()
        } else {
            String::new()
        };

        Ok(Self {
            parts,
            wildcard,
            prerelease,
        })
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == 3
    }

    fn part(&self, idx: usize) -> u64 {
        self.parts.get(idx).copied().unwrap_or(0)
    }

    /// Missing components filled with zeros.
    fn padded(&self) -> Version {
        Version {
            major: self.part(0),
            minor: self.part(1),
            patch: self.part(2),
            prerelease: self.prerelease.clone(),
        }
    }

    /// Half-open interval spanning the written prefix.
    fn x_range(&self) -> Result<Vec<Constraint>, &'static str> {
        let lower = Constraint::new(Op::Ge, self.padded());
        let upper = match self.parts.len() {
            0 => return Ok(vec![lower]),
            1 => Version::new(bump(self.part(0))?, 0, 0),
            2 => Version::new(self.part(0), bump(self.part(1))?, 0),
            _ => return Ok(vec![Constraint::new(Op::Eq, self.padded())]),
        };
        Ok(vec![lower, Constraint::new(Op::Lt, upper)])
    }
}

fn bump(n: u64) -> Result<u64, &'static str> {
    n.checked_add(1).ok_or("version component overflows")
}

/// Expand one scanned constraint into the constraints it stands for.
fn expand(op: &str, body: &str) -> Result<Vec<Constraint>, &'static str> {
    let modifier = Modifier::parse(op)?;
    let body = if body.eq_ignore_ascii_case("latest") {
        if modifier != Modifier::Bare {
            return Err("`latest` cannot take an operator");
        }
        "*"
    } else {
        body
    };
    let partial = PartialVersion::parse(body)?;

    match modifier {
        Modifier::Explicit(op) if !partial.is_complete() && op != Op::Eq => {
            Ok(vec![Constraint::new(op, partial.padded())])
        }
        Modifier::Explicit(op) if partial.is_complete() => {
            Ok(vec![Constraint::new(op, partial.padded())])
        }
        Modifier::Bare | Modifier::Explicit(_) => partial.x_range(),
        Modifier::Tilde | Modifier::Caret if partial.wildcard => partial.x_range(),
        Modifier::Tilde => {
            let lower = partial.padded();
            let upper = Version::new(lower.major, bump(lower.minor)?, 0);
            Ok(vec![
                Constraint::new(Op::Ge, lower),
                Constraint::new(Op::Lt, upper),
            ])
        }
        Modifier::Caret => {
            let lower = partial.padded();
            let upper = Version::new(bump(lower.major)?, 0, 0);
            Ok(vec![
                Constraint::new(Op::Ge, lower),
                Constraint::new(Op::Lt, upper),
            ])
        }
    }
}

/// Accumulates sets while the state machine runs.
struct Scanner<'a> {
    input: &'a str,
    sets: Vec<ConstraintSet>,
    current: ConstraintSet,
    op: String,
    body: String,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            sets: Vec::new(),
            current: ConstraintSet::default(),
            op: String::new(),
            body: String::new(),
        }
    }

    fn apply(&mut self, action: Action, c: Option<char>) -> Result<(), SemverError> {
        match action {
            Action::Skip => {}
            Action::BeginOperator => {
                self.op.clear();
                self.body.clear();
                self.op.extend(c);
            }
            Action::ExtendOperator => self.op.extend(c),
            Action::BeginBody | Action::ExtendBody => self.body.extend(c),
            Action::EndConstraint => {
                let expanded = expand(&self.op, &self.body)
                    .map_err(|reason| SemverError::invalid_range(self.input, reason))?;
                self.current.constraints.extend(expanded);
                self.op.clear();
                self.body.clear();
            }
            Action::EndSet => {
                if self.current.is_empty() {
                    return Err(SemverError::invalid_range(self.input, "empty constraint set"));
                }
                self.sets.push(std::mem::take(&mut self.current));
            }
            Action::Finish => {
                if !self.sets.is_empty() {
                    return Err(SemverError::invalid_range(self.input, "trailing `||`"));
                }
                self.sets = Range::any().sets;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(input: &str) -> String {
        Range::parse(input).unwrap().to_string()
    }

    fn sat(range: &str, version: &str) -> bool {
        Range::parse(range)
            .unwrap()
            .satisfies(&Version::parse(version).unwrap())
    }

    #[test]
    fn test_exact_and_explicit() {
        assert_eq!(canonical("2.0.0"), "=2.0.0");
        assert_eq!(canonical("=2.0.0"), "=2.0.0");
        assert_eq!(canonical(">=1.2.3"), ">=1.2.3");
        assert_eq!(canonical("<=1.2.3-beta"), "<=1.2.3-beta");
        assert_eq!(canonical("v1.2.3"), "=1.2.3");
    }

    #[test]
    fn test_build_metadata_dropped_before_prerelease() {
        assert_eq!(canonical("1.2.3+build-1"), "=1.2.3");
        assert_eq!(canonical(">=1.2.3-beta+exp.sha-5"), ">=1.2.3-beta");
        assert!(sat("1.2.3+build-1", "1.2.3"));
    }

    #[test]
    fn test_x_ranges_and_partials() {
        assert_eq!(canonical("1.0.x"), ">=1.0.0 <1.1.0");
        assert_eq!(canonical("1.x.x"), ">=1.0.0 <2.0.0");
        assert_eq!(canonical("1.x-alpha"), ">=1.0.0 <2.0.0");
        assert_eq!(canonical("2"), ">=2.0.0 <3.0.0");
        assert_eq!(canonical("3.1"), ">=3.1.0 <3.2.0");
        assert_eq!(canonical("*"), ">=0.0.0");
        assert_eq!(canonical("x"), ">=0.0.0");
        assert_eq!(canonical("latest"), ">=0.0.0");
        assert_eq!(canonical(""), ">=0.0.0");
    }

    #[test]
    fn test_tilde() {
        assert_eq!(canonical("~1.1.0"), ">=1.1.0 <1.2.0");
        assert_eq!(canonical("~1.1"), ">=1.1.0 <1.2.0");
        assert_eq!(canonical("~ 0.1.11"), ">=0.1.11 <0.2.0");
        assert_eq!(canonical("~1"), ">=1.0.0 <1.1.0");
    }

    #[test]
    fn test_caret_bumps_major_only() {
        assert_eq!(canonical("^2.0.0"), ">=2.0.0 <3.0.0");
        assert_eq!(canonical("^ 1.1"), ">=1.1.0 <2.0.0");
        assert_eq!(canonical("^0.1.2"), ">=0.1.2 <1.0.0");
    }

    #[test]
    fn test_x_wins_over_tilde_and_caret() {
        assert_eq!(canonical("~0.10.x"), ">=0.10.0 <0.11.0");
        assert_eq!(canonical("^0.10.x"), ">=0.10.0 <0.11.0");
    }

    #[test]
    fn test_operator_pads_partial() {
        assert_eq!(canonical(">= 1.5.x"), ">=1.5.0");
        assert_eq!(canonical(">=2.6.1 <4"), ">=2.6.1 <4.0.0");
    }

    #[test]
    fn test_or_sets() {
        assert_eq!(canonical("2.0 || 3"), ">=2.0.0 <2.1.0||>=3.0.0 <4.0.0");
        assert_eq!(
            canonical(">=1.0.0 <2.0.0 || >3.0.0 <6.0.0"),
            ">=1.0.0 <2.0.0||>3.0.0 <6.0.0"
        );
        assert_eq!(canonical("2.x||4.1.x"), ">=2.0.0 <3.0.0||>=4.1.0 <4.2.0");
        assert_eq!(Range::parse("1 || 2 || 3").unwrap().sets().len(), 3);
    }

    #[test]
    fn test_expansion_joins_current_set() {
        let range = Range::parse("~1.2.0 <1.2.5").unwrap();
        assert_eq!(range.sets().len(), 1);
        assert_eq!(range.to_string(), ">=1.2.0 <1.3.0 <1.2.5");
    }

    #[test]
    fn test_satisfies() {
        assert!(sat("1.0.x", "1.0.5"));
        assert!(!sat("1.0.x", "1.1.0"));
        assert!(sat("2 || 3 || 4", "3.9.9"));
        assert!(sat("2 || 3 || 4", "4.0.0"));
        assert!(!sat("2 || 3 || 4", "5.0.0"));
        assert!(!sat("2.x||4.1.x", "3.5.0"));
        assert!(sat("2.x||4.1.x", "2.9.0"));
        assert!(sat("2.x||4.1.x", "4.1.10"));
        assert!(!sat("2.x||4.1.x", "4.2.0"));
        assert!(!sat("2 || 5 || 3", "4.2.0"));
        assert!(sat("*", "0.0.1-alpha"));
    }

    #[test]
    fn test_invalid_ranges() {
        for input in [
            ">=",
            "1.0.0 ||",
            "|| 1.0.0",
            "1.0.0 | 2.0.0",
            "1.0.0 ||| 2.0.0",
            "~>=1.0.0",
            ">=~1.0.0",
            "^~1.0.0",
            "1.0.0<2.0.0",
            "1.2.3.4",
            "a.b.c",
            "1.0.0 @ 2",
            ">latest",
            "==1.0.0",
        ] {
            let err = Range::parse(input).unwrap_err();
            assert!(
                matches!(err, SemverError::InvalidRange { .. }),
                "{input:?} should be InvalidRange, got {err:?}"
            );
        }
    }

    #[test]
    fn test_transition_table() {
        use Action::*;
        use CharClass::*;
        use ScanState::*;

        assert_eq!(
            transition(ScanningConstraint, Operator),
            Ok((ScanningOperator, &[BeginOperator][..]))
        );
        assert_eq!(
            transition(ScanningOperator, Whitespace),
            Ok((ScanningOperator, &[Skip][..]))
        );
        assert_eq!(
            transition(ScanningVersionBody, Pipe),
            Ok((ScanningSetSeparator, &[EndConstraint][..]))
        );
        assert_eq!(
            transition(ScanningVersionBody, End),
            Ok((ScanningVersionBody, &[EndConstraint, EndSet][..]))
        );
        assert_eq!(
            transition(AfterConstraint, Pipe),
            Ok((ScanningSetSeparator, &[Skip][..]))
        );
        assert_eq!(
            transition(ScanningSetSeparator, Pipe),
            Ok((ScanningConstraint, &[EndSet][..]))
        );
        assert!(transition(ScanningSetSeparator, Body).is_err());
        assert!(transition(ScanningOperator, End).is_err());
        assert!(transition(ScanningVersionBody, Operator).is_err());
        assert!(transition(AfterConstraint, Other).is_err());
    }

    #[test]
    fn test_char_class() {
        assert_eq!(CharClass::of(' '), CharClass::Whitespace);
        assert_eq!(CharClass::of('^'), CharClass::Operator);
        assert_eq!(CharClass::of('|'), CharClass::Pipe);
        assert_eq!(CharClass::of('x'), CharClass::Body);
        assert_eq!(CharClass::of('*'), CharClass::Body);
        assert_eq!(CharClass::of('@'), CharClass::Other);
    }
}
