//! Version numbers and version constraints as written in Python manifests.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::ManifestError;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^
        v?
        (?:(?P<epoch>\d+)!)?
        (?P<release>\d+(?:\.\d+)*)
        (?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>\d*))?
        (?:-(?P<post_implicit>\d+)|[-_.]?(?:post|rev|r)[-_.]?(?P<post_n>\d*))?
        (?:[-_.]?dev[-_.]?(?P<dev_n>\d*))?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        (?P<wildcard>\.\*)?
        $",
    )
    .expect("version pattern is valid")
});

/// Pre-release phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreRelease::Alpha => "a",
            PreRelease::Beta => "b",
            PreRelease::Rc => "rc",
        }
    }
}

/// A PEP 440 version, optionally ending in a `.*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub epoch: u32,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<String>,
    pub wildcard: bool,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let invalid = || ManifestError::InvalidVersion(input.to_string());
        let trimmed = input.trim();
        let caps = VERSION_RE.captures(trimmed).ok_or_else(invalid)?;

        let number = |name: &str| -> Result<Option<u64>, ManifestError> {
            match caps.name(name) {
                None => Ok(None),
                Some(m) if m.as_str().is_empty() => Ok(Some(0)),
                Some(m) => m.as_str().parse().map(Some).map_err(|_| invalid()),
            }
        };

        let epoch = match caps.name("epoch") {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 0,
        };
        let release = caps["release"]
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let phase = match label.as_str().to_ascii_lowercase().as_str() {
                    "a" | "alpha" => PreRelease::Alpha,
                    "b" | "beta" => PreRelease::Beta,
                    _ => PreRelease::Rc,
                };
                Some((phase, number("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };

        // An empty numeric group still participates in the match, so `1.0.post`
        // reads as post-release 0.
        let post = match number("post_implicit")? {
            Some(n) => Some(n),
            None => number("post_n")?,
        };
        let dev = number("dev_n")?;
        let local = caps.name("local").map(|m| m.as_str().to_ascii_lowercase());

        // A prefix match only applies to the release segment.
        let wildcard = caps.name("wildcard").is_some();
        if wildcard && (pre.is_some() || post.is_some() || dev.is_some() || local.is_some()) {
            return Err(invalid());
        }

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
            wildcard,
        })
    }

    /// Number of release segments (`1.2.3` has three).
    pub fn release_len(&self) -> usize {
        self.release.len()
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }
}

impl FromStr for Version {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((phase, n)) = &self.pre {
            write!(f, "{}{}", phase.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{local}")?;
        }
        if self.wildcard {
            write!(f, ".*")?;
        }
        Ok(())
    }
}

/// Comparison operator of a single version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Compatible,
    Arbitrary,
    /// Poetry `^1.2`.
    Caret,
    /// Poetry `~1.2`.
    Tilde,
    /// Poetry `*`.
    Any,
}

impl Operator {
    // Longest tokens first so that `===` wins over `==`.
    const TOKENS: [(&'static str, Operator); 10] = [
        ("===", Operator::Arbitrary),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        ("<=", Operator::LessEqual),
        (">=", Operator::GreaterEqual),
        ("~=", Operator::Compatible),
        ("<", Operator::Less),
        (">", Operator::Greater),
        ("^", Operator::Caret),
        ("~", Operator::Tilde),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Compatible => "~=",
            Operator::Arbitrary => "===",
            Operator::Caret => "^",
            Operator::Tilde => "~",
            Operator::Any => "*",
        }
    }

    fn is_poetry_only(&self) -> bool {
        matches!(self, Operator::Caret | Operator::Tilde | Operator::Any)
    }
}

/// One `operator version` pair, e.g. `>=2.5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionSpecifier {
    pub operator: Operator,
    /// Normalised version text; empty for [`Operator::Any`].
    pub version: String,
}

impl VersionSpecifier {
    fn parse(input: &str, allow_poetry: bool) -> Result<Self, ManifestError> {
        let clause = input.trim();
        let invalid = |message: &str| ManifestError::InvalidRequirement {
            location: format!("'{clause}'"),
            message: message.to_string(),
        };

        if clause == "*" {
            if !allow_poetry {
                return Err(invalid("'*' is only valid in poetry constraints"));
            }
            return Ok(Self {
                operator: Operator::Any,
                version: String::new(),
            });
        }

        let matched = Operator::TOKENS
            .iter()
            .find(|(token, _)| clause.starts_with(token));

        let (operator, rest) = match matched {
            Some((token, op)) => (*op, clause[token.len()..].trim()),
            // A bare version in poetry is an exact pin.
            None if allow_poetry => (Operator::Equal, clause),
            None => return Err(invalid("missing comparison operator")),
        };

        if operator.is_poetry_only() && !allow_poetry {
            return Err(invalid("operator is only valid in poetry constraints"));
        }
        if rest.is_empty() {
            return Err(invalid("missing version"));
        }

        if operator == Operator::Arbitrary {
            if rest.chars().any(char::is_whitespace) {
                return Err(invalid("arbitrary equality takes a single token"));
            }
            return Ok(Self {
                operator,
                version: rest.to_string(),
            });
        }

        let version = Version::parse(rest)?;
        let eq_like = matches!(operator, Operator::Equal | Operator::NotEqual);
        if version.wildcard && !eq_like {
            return Err(invalid("'.*' suffix is only allowed with == and !="));
        }
        if version.local.is_some() && !eq_like {
            return Err(invalid("local versions are only allowed with == and !="));
        }
        if operator == Operator::Compatible && version.release_len() < 2 {
            return Err(invalid("'~=' needs at least two release segments"));
        }

        Ok(Self {
            operator,
            version: version.to_string(),
        })
    }

    /// True for an exact, non-wildcard pin.
    pub fn is_exact(&self) -> bool {
        match self.operator {
            Operator::Arbitrary => true,
            Operator::Equal => !self.version.ends_with(".*"),
            _ => false,
        }
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)
    }
}

/// A comma separated list of version constraints; empty means any version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionSpecifiers(pub Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// Parses PEP 440 specifiers such as `>=3.11,<4`.
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        Self::parse_with(input, false)
    }

    /// Parses poetry constraints, which add `^`, `~`, `*` and bare versions.
    pub fn parse_poetry(input: &str) -> Result<Self, ManifestError> {
        if input.contains("||") {
            return Err(ManifestError::InvalidRequirement {
                location: format!("'{}'", input.trim()),
                message: "alternative constraints ('||') are not supported".to_string(),
            });
        }
        Self::parse_with(input, true)
    }

    fn parse_with(input: &str, allow_poetry: bool) -> Result<Self, ManifestError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::default());
        }
        if !allow_poetry {
            return input
                .split(',')
                .map(|clause| VersionSpecifier::parse(clause, false))
                .collect::<Result<Vec<_>, _>>()
                .map(Self);
        }

        let mut specifiers = Vec::new();
        for group in input.split(',') {
            if group.trim().is_empty() {
                // Rejects the empty clause.
                specifiers.push(VersionSpecifier::parse(group, true)?);
            }
            for clause in poetry_clauses(group) {
                specifiers.push(VersionSpecifier::parse(&clause, true)?);
            }
        }
        Ok(Self(specifiers))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0.iter().all(|s| s.operator == Operator::Any)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }
}

/// Splits a poetry constraint on whitespace, which poetry reads as AND.
/// An operator standing alone (`>= 1.2`) is joined to the version after it.
fn poetry_clauses(group: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut pending = String::new();
    for token in group.split_whitespace() {
        pending.push_str(token);
        if !token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!' | '~' | '^')) {
            clauses.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        clauses.push(pending);
    }
    clauses
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for VersionSpecifiers {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionSpecifiers::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_release() {
        let v = Version::parse("2.0.36").unwrap();
        assert_eq!(v.release, vec![2, 0, 36]);
        assert_eq!(v.epoch, 0);
        assert!(!v.is_prerelease());
        assert_eq!(v.to_string(), "2.0.36");
    }

    #[test]
    fn test_parse_normalises_pre_post_dev() {
        let v = Version::parse("1.0-Beta.2").unwrap();
        assert_eq!(v.pre, Some((PreRelease::Beta, 2)));
        assert_eq!(v.to_string(), "1.0b2");

        let v = Version::parse("1!3.1rc1.post2.dev3+ubuntu.1").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.pre, Some((PreRelease::Rc, 1)));
        assert_eq!(v.post, Some(2));
        assert_eq!(v.dev, Some(3));
        assert_eq!(v.local.as_deref(), Some("ubuntu.1"));
        assert_eq!(v.to_string(), "1!3.1rc1.post2.dev3+ubuntu.1");

        let v = Version::parse("1.0-3").unwrap();
        assert_eq!(v.post, Some(3));
    }

    #[test]
    fn test_parse_wildcard() {
        let v = Version::parse("3.12.*").unwrap();
        assert!(v.wildcard);
        assert_eq!(v.release, vec![3, 12]);
        assert_eq!(v.to_string(), "3.12.*");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "abc", "1..2", "1.2.", ".1", "1.2.*.3"] {
            assert!(Version::parse(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_specifiers_pep440() {
        let specs = VersionSpecifiers::parse(" >=3.11 , <4 ").unwrap();
        assert_eq!(specs.0.len(), 2);
        assert_eq!(specs.0[0].operator, Operator::GreaterEqual);
        assert_eq!(specs.to_string(), ">=3.11,<4");

        let specs = VersionSpecifiers::parse("===foobar").unwrap();
        assert!(specs.0[0].is_exact());
    }

    #[test]
    fn test_specifiers_empty_means_any() {
        let specs = VersionSpecifiers::parse("   ").unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_wildcard_only_with_equality() {
        assert!(VersionSpecifiers::parse("==2.*").is_ok());
        assert!(VersionSpecifiers::parse("!=2.1.*").is_ok());
        assert!(VersionSpecifiers::parse(">=2.*").is_err());
    }

    #[test]
    fn test_compatible_release_needs_two_segments() {
        assert!(VersionSpecifiers::parse("~=2.2").is_ok());
        assert!(VersionSpecifiers::parse("~=2").is_err());
    }

    #[test]
    fn test_poetry_operators_rejected_in_pep440() {
        assert!(VersionSpecifiers::parse("^1.2").is_err());
        assert!(VersionSpecifiers::parse("1.2").is_err());
        assert!(VersionSpecifiers::parse("*").is_err());
    }

    #[test]
    fn test_poetry_constraints() {
        let specs = VersionSpecifiers::parse_poetry("^2.5.3").unwrap();
        assert_eq!(specs.0[0].operator, Operator::Caret);
        assert_eq!(specs.to_string(), "^2.5.3");

        let specs = VersionSpecifiers::parse_poetry("1.4.0").unwrap();
        assert_eq!(specs.0[0].operator, Operator::Equal);
        assert!(specs.0[0].is_exact());

        let specs = VersionSpecifiers::parse_poetry("*").unwrap();
        assert!(specs.is_empty());

        assert!(VersionSpecifiers::parse_poetry("^1.0 || ^2.0").is_err());
    }

    #[test]
    fn test_poetry_whitespace_is_and() {
        let specs = VersionSpecifiers::parse_poetry(">=1.2 <2.0").unwrap();
        assert_eq!(specs.0.len(), 2);
        assert_eq!(specs.to_string(), ">=1.2,<2.0");

        let specs = VersionSpecifiers::parse_poetry(">= 1.2, < 2.0 !=1.5").unwrap();
        assert_eq!(specs.to_string(), ">=1.2,<2.0,!=1.5");

        assert!(VersionSpecifiers::parse_poetry(">=1.2 <").is_err());
        assert!(VersionSpecifiers::parse_poetry(">=1.2,").is_err());
    }

    #[test]
    fn test_wildcard_only_after_release() {
        for input in ["==1.0+abc.*", "==1.0rc1.*", "==1.0.post1.*", "!=1.0.dev0.*"] {
            assert!(VersionSpecifiers::parse(input).is_err(), "{input:?} should be rejected");
        }
        assert!(Version::parse("1.0+abc.*").is_err());
        assert!(VersionSpecifiers::parse("==1!2.0.*").is_ok());
    }

    #[test]
    fn test_equal_wildcard_is_not_exact() {
        let specs = VersionSpecifiers::parse("==1.*").unwrap();
        assert!(!specs.0[0].is_exact());
    }
}
