//! Dependency requirement strings (`name[extra]>=1.0 ; marker`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::version::VersionSpecifiers;
use crate::domain::error::ManifestError;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("name pattern is valid")
});

static SEPARATOR_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("separator pattern is valid"));

/// Returns true when `name` is a valid distribution name.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Normalises a distribution name: lowercase with `-`, `_`, `.` runs collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
    SEPARATOR_RUN_RE
        .replace_all(&name.to_ascii_lowercase(), "-")
        .into_owned()
}

/// A single declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    #[serde(default)]
    pub specifiers: VersionSpecifiers,
    /// Direct reference (`name @ https://...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Raw environment marker after `;`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl Requirement {
    /// Creates a requirement without extras or marker.
    pub fn new(name: impl Into<String>, specifiers: VersionSpecifiers) -> Self {
        Self {
            name: name.into(),
            extras: Vec::new(),
            specifiers,
            url: None,
            marker: None,
        }
    }

    /// Parses a PEP 508 requirement string.
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let (head, marker) = match input.split_once(';') {
            Some((head, marker)) => {
                let marker = marker.trim();
                if marker.is_empty() {
                    return Err(invalid(input, "empty environment marker"));
                }
                (head.trim(), Some(marker.to_string()))
            }
            None => (input.trim(), None),
        };

        let (head, url) = match head.split_once('@') {
            Some((head, url)) => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(invalid(input, "empty direct reference"));
                }
                if url.contains(char::is_whitespace) {
                    return Err(invalid(input, "direct reference cannot carry version constraints"));
                }
                (head.trim(), Some(url.to_string()))
            }
            None => (head, None),
        };

        let name_end = head
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
            .unwrap_or(head.len());
        let name = &head[..name_end];
        if !is_valid_name(name) {
            return Err(invalid(input, "invalid distribution name"));
        }

        let mut rest = head[name_end..].trim_start();

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| invalid(input, "unterminated extras list"))?;
            let list = after[..close].trim();
            if !list.is_empty() {
                for extra in list.split(',') {
                    let extra = extra.trim();
                    if !is_valid_name(extra) {
                        return Err(invalid(input, "invalid extra name"));
                    }
                    extras.push(extra.to_string());
                }
            }
            rest = after[close + 1..].trim_start();
        }

        if url.is_some() && !rest.is_empty() {
            return Err(invalid(input, "direct reference cannot carry version constraints"));
        }

        let rest = match rest.strip_prefix('(') {
            Some(inner) => inner
                .strip_suffix(')')
                .ok_or_else(|| invalid(input, "unbalanced parentheses"))?,
            None => rest,
        };

        let specifiers = VersionSpecifiers::parse(rest).map_err(|err| match err {
            ManifestError::InvalidRequirement { message, .. } => invalid(input, &message),
            other => invalid(input, &other.to_string()),
        })?;

        Ok(Self {
            name: name.to_string(),
            extras,
            specifiers,
            url,
            marker,
        })
    }

    /// Fills in details from another declaration of the same distribution.
    /// Constraints, references and markers already present win.
    pub fn absorb(&mut self, other: Requirement) {
        for extra in other.extras {
            if !self.extras.contains(&extra) {
                self.extras.push(extra);
            }
        }
        if self.is_unconstrained() {
            self.specifiers = other.specifiers;
            self.url = other.url;
        }
        if self.marker.is_none() {
            self.marker = other.marker;
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Exactly one exact, non-wildcard constraint.
    pub fn is_pinned(&self) -> bool {
        self.specifiers.0.len() == 1 && self.specifiers.0[0].is_exact()
    }

    /// No constraint at all and no direct reference.
    pub fn is_unconstrained(&self) -> bool {
        self.url.is_none() && self.specifiers.is_empty()
    }
}

fn invalid(input: &str, message: &str) -> ManifestError {
    ManifestError::InvalidRequirement {
        location: format!("'{}'", input.trim()),
        message: message.to_string(),
    }
}

impl FromStr for Requirement {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Requirement::parse(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {url}")?;
        } else {
            write!(f, "{}", self.specifiers)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}
