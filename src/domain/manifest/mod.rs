//! Dependency manifest model.
//!
//! A manifest declares project metadata, the production dependency set and any
//! number of optional dependency groups (testing, linting, tools, ...). The three
//! supported layouts (poetry, pdm, uv) are normalised into one [`Manifest`] so
//! that validation and setup-command generation do not care where a
//! requirement was declared.

pub mod pyproject;
pub mod requirement;
pub mod setup;
pub mod version;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ManifestError;

pub use requirement::{Requirement, normalize_name};
pub use setup::{InstallSelection, selection_commands, setup_commands};
pub use version::{Operator, Version, VersionSpecifier, VersionSpecifiers};

/// Package manager a manifest is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Poetry,
    Pdm,
    Uv,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Poetry => "poetry",
            PackageManager::Pdm => "pdm",
            PackageManager::Uv => "uv",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poetry" => Ok(PackageManager::Poetry),
            "pdm" => Ok(PackageManager::Pdm),
            "uv" => Ok(PackageManager::Uv),
            other => Err(ManifestError::UnknownManager(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Author {
    /// Parses poetry's `"Name <email>"` form.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match (input.find('<'), input.rfind('>')) {
            (Some(open), Some(close)) if open < close => Self {
                name: input[..open].trim().to_string(),
                email: Some(input[open + 1..close].trim().to_string()),
            },
            _ => Self {
                name: input.to_string(),
                email: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub license: Option<String>,
    pub readme: Option<String>,
    pub requires_python: Option<VersionSpecifiers>,
}

impl ProjectMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            authors: Vec::new(),
            license: None,
            readme: None,
            requires_python: None,
        }
    }
}

/// A normalised dependency manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub manager: Option<PackageManager>,
    pub project: ProjectMetadata,
    /// Production dependency set.
    pub dependencies: Vec<Requirement>,
    /// Optional groups keyed by name, iterated in name order.
    pub groups: BTreeMap<String, Vec<Requirement>>,
    /// How each optional group was declared.
    #[serde(default)]
    pub origins: BTreeMap<String, GroupOrigin>,
}

/// Declaration kinds of an optional group. Extras and dependency groups are
/// installed with different flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOrigin {
    pub extra: bool,
    pub dependency_group: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A finding produced by [`Manifest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestIssue {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl ManifestIssue {
    fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
        }
    }

    fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{label}: {}: {}", self.location, self.message)
    }
}

impl Manifest {
    /// Name under which the production set is addressed.
    pub const MAIN_GROUP: &'static str = "main";

    pub fn new(project: ProjectMetadata) -> Self {
        Self {
            manager: None,
            project,
            dependencies: Vec::new(),
            groups: BTreeMap::new(),
            origins: BTreeMap::new(),
        }
    }

    /// `main` followed by the optional groups in name order.
    pub fn group_names(&self) -> Vec<&str> {
        std::iter::once(Self::MAIN_GROUP)
            .chain(self.groups.keys().map(String::as_str))
            .collect()
    }

    pub fn group(&self, name: &str) -> Option<&[Requirement]> {
        if name == Self::MAIN_GROUP {
            return Some(&self.dependencies);
        }
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Appends requirements to a dependency group, creating it when needed.
    pub fn extend_group(&mut self, name: &str, requirements: impl IntoIterator<Item = Requirement>) {
        if name == Self::MAIN_GROUP {
            self.dependencies.extend(requirements);
            return;
        }
        self.origins.entry(name.to_string()).or_default().dependency_group = true;
        self.groups
            .entry(name.to_string())
            .or_default()
            .extend(requirements);
    }

    /// Appends requirements to an optional-dependencies extra.
    pub fn extend_extra(&mut self, name: &str, requirements: impl IntoIterator<Item = Requirement>) {
        self.origins.entry(name.to_string()).or_default().extra = true;
        self.groups
            .entry(name.to_string())
            .or_default()
            .extend(requirements);
    }

    /// Adds production requirements, folding each into an existing entry of
    /// the same normalised name. Used when a second table restates `[project]`
    /// dependencies with tool-specific details.
    pub fn merge_main(&mut self, requirements: impl IntoIterator<Item = Requirement>) {
        for req in requirements {
            let key = req.normalized_name();
            match self
                .dependencies
                .iter_mut()
                .find(|existing| existing.normalized_name() == key)
            {
                Some(existing) => existing.absorb(req),
                None => self.dependencies.push(req),
            }
        }
    }

    /// Total number of declared requirements across all groups.
    pub fn requirement_count(&self) -> usize {
        self.dependencies.len() + self.groups.values().map(Vec::len).sum::<usize>()
    }

    /// Checks the manifest for structural problems. Errors sort before warnings.
    pub fn validate(&self) -> Vec<ManifestIssue> {
        let mut issues = Vec::new();

        if self.project.requires_python.is_none() {
            issues.push(ManifestIssue::warning(
                "project",
                "no supported Python version range declared",
            ));
        }
        if let Some(version) = &self.project.version {
            if Version::parse(version).is_err() {
                issues.push(ManifestIssue::error(
                    "project.version",
                    format!("'{version}' is not a valid version"),
                ));
            }
        }

        let main_constraints: HashMap<String, &Requirement> = self
            .dependencies
            .iter()
            .map(|req| (req.normalized_name(), req))
            .collect();

        for group in self.group_names() {
            let requirements = self.group(group).unwrap_or_default();
            let mut seen = HashSet::new();
            for req in requirements {
                let key = req.normalized_name();
                let location = format!("{group}.{}", req.name);

                if !seen.insert(key.clone()) {
                    issues.push(ManifestIssue::error(
                        location.clone(),
                        "declared more than once in the same group",
                    ));
                }
                if req.is_unconstrained() {
                    issues.push(ManifestIssue::warning(
                        location.clone(),
                        "no version constraint",
                    ));
                }
                if group != Self::MAIN_GROUP {
                    if let Some(main) = main_constraints.get(&key) {
                        if main.specifiers != req.specifiers || main.url != req.url {
                            issues.push(ManifestIssue::warning(
                                location,
                                format!(
                                    "constraint differs from main dependency '{}'",
                                    main
                                ),
                            ));
                        }
                    }
                }
            }
        }

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }

    pub fn has_errors(issues: &[ManifestIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(s: &str) -> Requirement {
        Requirement::parse(s).unwrap()
    }

    fn sample() -> Manifest {
        let mut project = ProjectMetadata::new("boilerplate");
        project.version = Some("0.1.0".to_string());
        project.requires_python = Some(VersionSpecifiers::parse(">=3.11,<4").unwrap());
        let mut manifest = Manifest::new(project);
        manifest.extend_group("main", [req("pydantic==2.5.3"), req("httpx==0.26.0")]);
        manifest.extend_group("testing", [req("pytest==7.4.4")]);
        manifest.extend_group("linting", [req("ruff==0.1.13")]);
        manifest
    }

    #[test]
    fn test_group_names_main_first_then_sorted() {
        let manifest = sample();
        assert_eq!(manifest.group_names(), vec!["main", "linting", "testing"]);
        assert_eq!(manifest.group("main").unwrap().len(), 2);
        assert!(manifest.group("tools").is_none());
        assert_eq!(manifest.requirement_count(), 4);
    }

    #[test]
    fn test_clean_manifest_has_no_issues() {
        assert!(sample().validate().is_empty());
    }

    #[test]
    fn test_duplicate_in_group_is_error() {
        let mut manifest = sample();
        manifest.extend_group("testing", [req("PyTest==7.4.3")]);
        let issues = manifest.validate();
        assert!(Manifest::has_errors(&issues));
        assert_eq!(issues[0].location, "testing.PyTest");
    }

    #[test]
    fn test_unconstrained_is_warning() {
        let mut manifest = sample();
        manifest.extend_group("tools", [req("ipython")]);
        let issues = manifest.validate();
        assert!(!Manifest::has_errors(&issues));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].location, "tools.ipython");
    }

    #[test]
    fn test_conflicting_constraint_across_groups() {
        let mut manifest = sample();
        manifest.extend_group("testing", [req("httpx==0.25.0")]);
        let issues = manifest.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("httpx==0.26.0"));
    }

    #[test]
    fn test_missing_python_range_and_bad_version() {
        let mut manifest = sample();
        manifest.project.requires_python = None;
        manifest.project.version = Some("one".to_string());
        let issues = manifest.validate();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[1].severity, Severity::Warning);
    }

    #[test]
    fn test_extras_and_groups_keep_their_origin() {
        let mut manifest = sample();
        manifest.extend_extra("redis", [req("redis>=5.2")]);
        manifest.extend_group("docs", [req("mkdocs==1.6.0")]);
        manifest.extend_extra("docs", [req("sphinx==7.3.7")]);

        assert_eq!(
            manifest.origins["redis"],
            GroupOrigin { extra: true, dependency_group: false }
        );
        assert_eq!(
            manifest.origins["docs"],
            GroupOrigin { extra: true, dependency_group: true }
        );
        assert!(manifest.origins["testing"].dependency_group);
        assert!(!manifest.origins.contains_key("main"));
        assert_eq!(manifest.group("docs").unwrap().len(), 2);
    }

    #[test]
    fn test_merge_main_folds_same_name() {
        let mut manifest = sample();
        manifest.merge_main([req("HTTPX"), req("anyio>=4")]);
        assert_eq!(manifest.dependencies.len(), 3);
        let httpx = &manifest.dependencies[1];
        assert_eq!(httpx.name, "httpx");
        assert_eq!(httpx.to_string(), "httpx==0.26.0");
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn test_package_manager_from_str() {
        assert_eq!("UV".parse::<PackageManager>().unwrap(), PackageManager::Uv);
        assert_eq!("poetry".parse::<PackageManager>().unwrap(), PackageManager::Poetry);
        assert!("pip".parse::<PackageManager>().is_err());
    }

    #[test]
    fn test_author_parse() {
        let author = Author::parse("Khiem Doan <doankhiem.crazy@gmail.com>");
        assert_eq!(author.name, "Khiem Doan");
        assert_eq!(author.email.as_deref(), Some("doankhiem.crazy@gmail.com"));

        let author = Author::parse("Anonymous");
        assert!(author.email.is_none());
    }
}
