//! `pyproject.toml` layouts for poetry, pdm and uv.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::requirement::is_valid_name;
use super::{Author, Manifest, PackageManager, ProjectMetadata, Requirement, VersionSpecifiers};
use crate::domain::error::{AppError, ManifestError};

/// Maximum nesting of `{ include-group = ... }` references.
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PyProject {
    project: Option<ProjectTable>,
    #[serde(default)]
    dependency_groups: BTreeMap<String, Vec<GroupEntry>>,
    build_system: Option<BuildSystem>,
    #[serde(default)]
    tool: ToolTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProjectTable {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    authors: Vec<AuthorEntry>,
    license: Option<TextOrFile>,
    readme: Option<TextOrFile>,
    requires_python: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AuthorEntry {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrFile {
    Text(String),
    Table {
        text: Option<String>,
        file: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupEntry {
    Requirement(String),
    Include {
        #[serde(rename = "include-group")]
        include_group: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BuildSystem {
    build_backend: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolTable {
    poetry: Option<PoetryTable>,
    pdm: Option<PdmTable>,
    uv: Option<UvTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PoetryTable {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    license: Option<String>,
    readme: Option<toml::Value>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    group: BTreeMap<String, PoetryGroup>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct PoetryGroup {
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PdmTable {
    #[serde(default)]
    dev_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UvTable {
    #[serde(default)]
    dev_dependencies: Vec<String>,
}

impl Manifest {
    /// Parses a `pyproject.toml` document written for poetry, pdm or uv.
    pub fn from_toml_str(text: &str) -> Result<Manifest, AppError> {
        let document: PyProject = toml::from_str(text).map_err(ManifestError::from)?;
        let manager = detect_manager(&document);
        debug!(manager = ?manager, "Parsing manifest");

        let PyProject {
            project,
            dependency_groups,
            build_system: _,
            tool,
        } = document;
        let has_project_table = project.is_some();
        let project = project.unwrap_or_default();
        let poetry = tool.poetry.unwrap_or_default();

        let metadata = build_metadata(&project, &poetry)?;
        let mut manifest = Manifest::new(metadata);
        manifest.manager = manager;

        // PEP 621 sections.
        manifest.extend_group(
            Manifest::MAIN_GROUP,
            parse_list(&project.dependencies, "project.dependencies")?,
        );
        for (group, entries) in &project.optional_dependencies {
            let location = format!("project.optional-dependencies.{group}");
            manifest.extend_extra(group, parse_list(entries, &location)?);
        }

        // PEP 735 groups (uv).
        for group in dependency_groups.keys() {
            let requirements = resolve_group(&dependency_groups, group, 0)?;
            manifest.extend_group(group, requirements);
        }
        if let Some(uv) = &tool.uv {
            manifest.extend_group(
                "dev",
                parse_list(&uv.dev_dependencies, "tool.uv.dev-dependencies")?,
            );
        }

        // pdm development groups.
        if let Some(pdm) = &tool.pdm {
            for (group, entries) in &pdm.dev_dependencies {
                let location = format!("tool.pdm.dev-dependencies.{group}");
                manifest.extend_group(group, parse_list(entries, &location)?);
            }
        }

        // poetry tables. With a `[project]` table (poetry 2) the poetry entries
        // only enrich the PEP 621 dependencies of the same name.
        let mut poetry_main = Vec::with_capacity(poetry.dependencies.len());
        for (name, value) in &poetry.dependencies {
            if name == "python" {
                continue;
            }
            let location = format!("tool.poetry.dependencies.{name}");
            poetry_main.push(parse_poetry_dependency(name, value, &location)?);
        }
        if has_project_table {
            manifest.merge_main(poetry_main);
        } else {
            manifest.extend_group(Manifest::MAIN_GROUP, poetry_main);
        }
        for (group, table) in &poetry.group {
            for (name, value) in &table.dependencies {
                let location = format!("tool.poetry.group.{group}.dependencies.{name}");
                manifest.extend_group(group, [parse_poetry_dependency(name, value, &location)?]);
            }
        }
        for (name, value) in &poetry.dev_dependencies {
            let location = format!("tool.poetry.dev-dependencies.{name}");
            manifest.extend_group("dev", [parse_poetry_dependency(name, value, &location)?]);
        }

        Ok(manifest)
    }

    /// Reads and parses a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Manifest, AppError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }
}

impl PackageManager {
    /// Detects the package manager a `pyproject.toml` document targets.
    pub fn detect(text: &str) -> Result<Option<PackageManager>, AppError> {
        let document: PyProject = toml::from_str(text).map_err(ManifestError::from)?;
        Ok(detect_manager(&document))
    }
}

fn detect_manager(document: &PyProject) -> Option<PackageManager> {
    if document.tool.poetry.is_some() {
        return Some(PackageManager::Poetry);
    }
    if document.tool.pdm.is_some() {
        return Some(PackageManager::Pdm);
    }
    if document.tool.uv.is_some() || !document.dependency_groups.is_empty() {
        return Some(PackageManager::Uv);
    }
    let backend = document
        .build_system
        .as_ref()
        .and_then(|b| b.build_backend.as_deref())?;
    if backend.starts_with("poetry") {
        Some(PackageManager::Poetry)
    } else if backend.starts_with("pdm") {
        Some(PackageManager::Pdm)
    } else {
        None
    }
}

fn build_metadata(project: &ProjectTable, poetry: &PoetryTable) -> Result<ProjectMetadata, AppError> {
    let name = project
        .name
        .clone()
        .or_else(|| poetry.name.clone())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ManifestError::MissingField("project.name".to_string()))?;

    let mut metadata = ProjectMetadata::new(name);
    metadata.version = project.version.clone().or_else(|| poetry.version.clone());
    metadata.description = project
        .description
        .clone()
        .or_else(|| poetry.description.clone());

    metadata.authors = if project.authors.is_empty() {
        poetry.authors.iter().map(|a| Author::parse(a)).collect()
    } else {
        project
            .authors
            .iter()
            .map(|a| Author {
                name: a.name.clone().unwrap_or_default(),
                email: a.email.clone(),
            })
            .collect()
    };

    metadata.license = match &project.license {
        Some(TextOrFile::Text(text)) => Some(text.clone()),
        Some(TextOrFile::Table { text, file }) => text.clone().or_else(|| file.clone()),
        None => poetry.license.clone(),
    };
    metadata.readme = match &project.readme {
        Some(TextOrFile::Text(text)) => Some(text.clone()),
        Some(TextOrFile::Table { text, file }) => file.clone().or_else(|| text.clone()),
        None => poetry.readme.as_ref().and_then(|v| match v {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Array(items) => items.first().and_then(|i| i.as_str()).map(String::from),
            _ => None,
        }),
    };

    metadata.requires_python = match (&project.requires_python, poetry.dependencies.get("python")) {
        (Some(range), _) => Some(
            VersionSpecifiers::parse(range).map_err(|e| located("project.requires-python", e))?,
        ),
        (None, Some(toml::Value::String(range))) => Some(
            VersionSpecifiers::parse_poetry(range)
                .map_err(|e| located("tool.poetry.dependencies.python", e))?,
        ),
        (None, Some(_)) => {
            return Err(invalid_at(
                "tool.poetry.dependencies.python",
                "python constraint must be a string",
            ));
        }
        (None, None) => None,
    };

    Ok(metadata)
}

fn parse_list(entries: &[String], location: &str) -> Result<Vec<Requirement>, AppError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            Requirement::parse(entry)
                .map_err(|e| AppError::from(located(&format!("{location}[{index}]"), e)))
        })
        .collect()
}

fn resolve_group(
    groups: &BTreeMap<String, Vec<GroupEntry>>,
    name: &str,
    depth: usize,
) -> Result<Vec<Requirement>, AppError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(invalid_at(
            &format!("dependency-groups.{name}"),
            "include-group nesting too deep (cycle?)",
        ));
    }
    let entries = groups.get(name).ok_or_else(|| {
        invalid_at(
            &format!("dependency-groups.{name}"),
            "included group does not exist",
        )
    })?;

    let mut requirements = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match entry {
            GroupEntry::Requirement(text) => {
                let location = format!("dependency-groups.{name}[{index}]");
                requirements.push(Requirement::parse(text).map_err(|e| located(&location, e))?);
            }
            GroupEntry::Include { include_group } => {
                requirements.extend(resolve_group(groups, include_group, depth + 1)?);
            }
        }
    }
    Ok(requirements)
}

fn parse_poetry_dependency(
    name: &str,
    value: &toml::Value,
    location: &str,
) -> Result<Requirement, AppError> {
    if !is_valid_name(name) {
        return Err(invalid_at(location, "invalid distribution name"));
    }

    match value {
        toml::Value::String(constraint) => {
            let specifiers =
                VersionSpecifiers::parse_poetry(constraint).map_err(|e| located(location, e))?;
            Ok(Requirement::new(name, specifiers))
        }
        toml::Value::Table(table) => {
            let specifiers = match table.get("version") {
                Some(toml::Value::String(constraint)) => {
                    VersionSpecifiers::parse_poetry(constraint).map_err(|e| located(location, e))?
                }
                Some(_) => return Err(invalid_at(location, "version must be a string")),
                None => VersionSpecifiers::default(),
            };

            let extras = match table.get("extras") {
                Some(toml::Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .filter(|extra| is_valid_name(extra))
                            .map(String::from)
                            .ok_or_else(|| invalid_at(location, "invalid extra name"))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => return Err(invalid_at(location, "extras must be an array")),
                None => Vec::new(),
            };

            let url = if let Some(git) = table.get("git").and_then(toml::Value::as_str) {
                Some(format!("git+{git}"))
            } else {
                table
                    .get("url")
                    .or_else(|| table.get("path"))
                    .and_then(toml::Value::as_str)
                    .map(String::from)
            };

            Ok(Requirement {
                name: name.to_string(),
                extras,
                specifiers,
                url,
                marker: table
                    .get("markers")
                    .and_then(toml::Value::as_str)
                    .map(String::from),
            })
        }
        toml::Value::Array(_) => Err(invalid_at(
            location,
            "multiple-constraint dependencies are not supported",
        )),
        _ => Err(invalid_at(location, "expected a version string or a table")),
    }
}

fn located(location: &str, err: ManifestError) -> ManifestError {
    let message = match err {
        ManifestError::InvalidRequirement { message, .. } => message,
        other => other.to_string(),
    };
    ManifestError::InvalidRequirement {
        location: location.to_string(),
        message,
    }
}

fn invalid_at(location: &str, message: &str) -> AppError {
    ManifestError::InvalidRequirement {
        location: location.to_string(),
        message: message.to_string(),
    }
    .into()
}
