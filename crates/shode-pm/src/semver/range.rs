//! Range expressions
//!
//! Every supported syntax (caret, tilde, wildcard, hyphen, comparison,
//! bare version) is translated into a conjunction of primitive
//! [`Constraint`]s. Matching is the AND of those constraints.

use super::{SemverError, Version};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a primitive constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// One operator paired with a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
}

/// A conjunction of constraints
///
/// An empty conjunction places no restriction on the version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Range {
    constraints: Vec<Constraint>,
}

impl Op {
    /// Operator as written in range expressions
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }
}

impl Constraint {
    pub fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    /// Check if a version satisfies this constraint
    pub fn matches(&self, version: &Version) -> bool {
        let ord = version.cmp(&self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
        }
    }
}

impl Range {
    /// Build a range from already-parsed constraints
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    /// The unconstrained range (`>=0.0.0`)
    pub fn any() -> Self {
        Self::new(vec![Constraint::new(Op::Ge, Version::new(0, 0, 0))])
    }

    /// Parse a range expression
    ///
    /// Supported forms:
    /// - `""`, `*`, `x`, `X` → `>=0.0.0`
    /// - `^1.2.3` → `>=1.2.3 <2.0.0` (`^0.2.3` → `<0.3.0`, `^0.0.3` → `<0.0.4`)
    /// - `~1.2.3`, `~1.2` → `<1.3.0`; `~1` → `<2.0.0`
    /// - `1.2.x`, `1.x`, `1.2`, `1` → bounded by the last concrete component
    /// - `1.2.3 - 2.3.4` → `>=1.2.3 <=2.3.4`
    /// - `>=1.0.0`, `>1.0.0`, `<=1.0.0`, `<1.0.0`, `=1.0.0` → single constraint
    /// - `1.2.3` → exact match
    ///
    /// Whitespace-separated forms are intersected: `>=1.2.0 <2.0.0`.
    pub fn parse(expr: &str) -> Result<Self, SemverError> {
        let expr = expr.trim();

        if expr.contains("||") {
            return Err(invalid(expr, "unions ('||') are not supported"));
        }

        if is_wildcard(expr) {
            return Ok(Self::any());
        }

        if let Some((low, high)) = expr.split_once(" - ") {
            let low = Version::parse(low.trim())?;
            let high = Version::parse(high.trim())?;
            return Ok(Self::new(vec![
                Constraint::new(Op::Ge, low),
                Constraint::new(Op::Le, high),
            ]));
        }

        let mut constraints = Vec::new();
        for token in tokenize(expr)? {
            constraints.extend(parse_primitive(&token, expr)?);
        }
        Ok(Self::new(constraints))
    }

    /// The primitive constraints of this range
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Check if a version satisfies every constraint
    pub fn matches(&self, version: &Version) -> bool {
        self.constraints.iter().all(|c| c.matches(version))
    }

    /// Conjunction of both ranges
    ///
    /// The result may admit no version at all; see [`Range::is_satisfiable`].
    pub fn intersect(&self, other: &Range) -> Range {
        let mut constraints = self.constraints.clone();
        constraints.extend(other.constraints.iter().cloned());
        Range::new(constraints)
    }

    /// Highest candidate satisfying the range
    pub fn max_satisfying<'a>(&self, versions: &'a [Version]) -> Option<&'a Version> {
        versions
            .iter()
            .filter(|v| self.matches(v))
            .fold(None, |best: Option<&Version>, v| match best {
                Some(b) if b >= v => Some(b),
                _ => Some(v),
            })
    }

    /// Lowest candidate satisfying the range
    pub fn min_satisfying<'a>(&self, versions: &'a [Version]) -> Option<&'a Version> {
        versions
            .iter()
            .filter(|v| self.matches(v))
            .fold(None, |best: Option<&Version>, v| match best {
                Some(b) if b <= v => Some(b),
                _ => Some(v),
            })
    }

    /// Check whether any version could satisfy the conjunction
    ///
    /// Compares the tightest lower bound against the tightest upper bound,
    /// independent of any candidate list.
    pub fn is_satisfiable(&self) -> bool {
        let mut lower: Option<(&Version, bool)> = None;
        let mut upper: Option<(&Version, bool)> = None;

        for c in &self.constraints {
            let v = &c.version;
            match c.op {
                Op::Ge => lower = Some(tighter(lower, (v, true), Ordering::Greater)),
                Op::Gt => lower = Some(tighter(lower, (v, false), Ordering::Greater)),
                Op::Le => upper = Some(tighter(upper, (v, true), Ordering::Less)),
                Op::Lt => upper = Some(tighter(upper, (v, false), Ordering::Less)),
                Op::Eq => {
                    lower = Some(tighter(lower, (v, true), Ordering::Greater));
                    upper = Some(tighter(upper, (v, true), Ordering::Less));
                }
            }
        }

        match (lower, upper) {
            (Some((low, low_inclusive)), Some((high, high_inclusive))) => match low.cmp(high) {
                Ordering::Less => true,
                Ordering::Equal => low_inclusive && high_inclusive,
                Ordering::Greater => false,
            },
            _ => true,
        }
    }
}

/// Pick the stricter of two bounds; `wins` is the ordering that makes the
/// new bound stricter (Greater for lower bounds, Less for upper bounds).
fn tighter<'a>(
    current: Option<(&'a Version, bool)>,
    candidate: (&'a Version, bool),
    wins: Ordering,
) -> (&'a Version, bool) {
    match current {
        None => candidate,
        Some(cur) => {
            let ord = candidate.0.cmp(cur.0);
            if ord == wins {
                candidate
            } else if ord == Ordering::Equal {
                (cur.0, cur.1 && candidate.1)
            } else {
                cur
            }
        }
    }
}

fn invalid(expr: &str, reason: impl Into<String>) -> SemverError {
    SemverError::InvalidRange {
        range: expr.to_string(),
        reason: reason.into(),
    }
}

fn overflow(expr: &str) -> SemverError {
    invalid(expr, "upper bound exceeds the largest representable version")
}

fn is_wildcard(s: &str) -> bool {
    matches!(s, "" | "*" | "x" | "X")
}

/// Split on whitespace, gluing a lone operator to the version after it
/// (`>= 1.2.0` is the same as `>=1.2.0`).
fn tokenize(expr: &str) -> Result<Vec<String>, SemverError> {
    let mut tokens = Vec::new();
    let mut pending: Option<&str> = None;

    for part in expr.split_whitespace() {
        match pending.take() {
            Some(op) => tokens.push(format!("{}{}", op, part)),
            None if matches!(part, ">=" | ">" | "<=" | "<" | "=" | "^" | "~") => {
                pending = Some(part)
            }
            None => tokens.push(part.to_string()),
        }
    }

    if let Some(op) = pending {
        return Err(invalid(expr, format!("operator '{}' has no version", op)));
    }
    Ok(tokens)
}

fn parse_primitive(token: &str, expr: &str) -> Result<Vec<Constraint>, SemverError> {
    if let Some(rest) = token.strip_prefix('^') {
        return parse_caret(rest, expr);
    }
    if let Some(rest) = token.strip_prefix('~') {
        return parse_tilde(rest, expr);
    }

    // Two-character operators must be tried before their prefixes
    let operators = [
        (">=", Op::Ge),
        ("<=", Op::Le),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("=", Op::Eq),
    ];
    for (prefix, op) in operators {
        if let Some(rest) = token.strip_prefix(prefix) {
            let version = Version::parse(rest)?;
            return Ok(vec![Constraint::new(op, version)]);
        }
    }

    if let Some(constraints) = parse_wildcard(token, expr)? {
        return Ok(constraints);
    }

    Ok(vec![Constraint::new(Op::Eq, Version::parse(token)?)])
}

fn parse_caret(rest: &str, expr: &str) -> Result<Vec<Constraint>, SemverError> {
    let version = Version::parse(rest)?;
    let upper = if version.major > 0 {
        version.bump_major()
    } else if version.minor > 0 {
        version.bump_minor()
    } else {
        version.bump_patch()
    }
    .ok_or_else(|| overflow(expr))?;
    Ok(vec![
        Constraint::new(Op::Ge, version),
        Constraint::new(Op::Lt, upper),
    ])
}

fn parse_tilde(rest: &str, expr: &str) -> Result<Vec<Constraint>, SemverError> {
    let rest = rest.trim();
    let has_suffix = rest.contains(['-', '+']);
    let given = rest.split(['-', '+']).next().unwrap_or("").split('.').count();

    let padded = match (given, has_suffix) {
        (1, false) => format!("{}.0.0", rest),
        (2, false) => format!("{}.0", rest),
        (3, _) => rest.to_string(),
        _ => return Err(invalid(expr, "tilde needs MAJOR[.MINOR[.PATCH]]")),
    };

    let version = Version::parse(&padded)?;
    let upper = if given == 1 {
        version.bump_major()
    } else {
        version.bump_minor()
    }
    .ok_or_else(|| overflow(expr))?;
    Ok(vec![
        Constraint::new(Op::Ge, version),
        Constraint::new(Op::Lt, upper),
    ])
}

/// Wildcard and partial forms (`1.2.x`, `1.x`, `1.2`, `1`)
///
/// Returns `Ok(None)` when the token is a complete version and should be
/// treated as an exact match instead.
fn parse_wildcard(token: &str, expr: &str) -> Result<Option<Vec<Constraint>>, SemverError> {
    if token.contains(['-', '+']) {
        return Ok(None);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() > 3 {
        return Ok(None);
    }

    let mut concrete = Vec::new();
    let mut wildcarded = false;
    for part in &parts {
        if matches!(*part, "x" | "X" | "*") {
            wildcarded = true;
        } else if wildcarded {
            return Err(invalid(expr, "concrete component after a wildcard"));
        } else {
            concrete.push(parse_number(part).ok_or_else(|| {
                invalid(expr, format!("'{}' is not a version component", part))
            })?);
        }
    }

    let (lower, upper) = match concrete.as_slice() {
        [] => return Ok(Some(Range::any().constraints)),
        [major] => {
            let lower = Version::new(*major, 0, 0);
            let upper = lower.bump_major();
            (lower, upper)
        }
        [major, minor] => {
            let lower = Version::new(*major, *minor, 0);
            let upper = lower.bump_minor();
            (lower, upper)
        }
        _ => return Ok(None),
    };
    let upper = upper.ok_or_else(|| overflow(expr))?;
    let constraints = vec![
        Constraint::new(Op::Ge, lower),
        Constraint::new(Op::Lt, upper),
    ];
    Ok(Some(constraints))
}

fn parse_number(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.version)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return f.write_str("*");
        }
        for (i, c) in self.constraints.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for Range {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Range::parse(s)
    }
}
