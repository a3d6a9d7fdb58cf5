//! Environment setup commands per package manager.

use super::{Manifest, PackageManager};
use crate::domain::error::{AppError, ManifestError};

/// Names to install on top of the main set, split by how the manifest
/// declares them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSelection {
    /// Dependency groups (poetry groups, PEP 735, pdm dev groups).
    pub groups: Vec<String>,
    /// `[project.optional-dependencies]` extras.
    pub extras: Vec<String>,
}

/// Returns the shell commands that create the environment, lock, install the
/// requested groups and activate the environment.
///
/// The `main` group is always installed and is skipped if present in `groups`.
pub fn setup_commands(manager: PackageManager, groups: &[String]) -> Vec<String> {
    selection_commands(
        manager,
        &InstallSelection {
            groups: groups.to_vec(),
            extras: Vec::new(),
        },
    )
}

/// Like [`setup_commands`], passing extras with the manager's extra flag.
pub fn selection_commands(manager: PackageManager, selection: &InstallSelection) -> Vec<String> {
    let groups = clean(&selection.groups);
    let extras = clean(&selection.extras);

    match manager {
        PackageManager::Poetry => {
            let mut install = String::from("poetry install");
            if !groups.is_empty() {
                install.push_str(" --with ");
                install.push_str(&groups.join(","));
            }
            for extra in &extras {
                install.push_str(" -E ");
                install.push_str(extra);
            }
            vec![
                "poetry env use python3".to_string(),
                "poetry lock".to_string(),
                install,
                "eval $(poetry env activate)".to_string(),
            ]
        }
        PackageManager::Pdm => {
            // pdm selects optional dependencies and dev groups with the same flag.
            let mut sync = String::from("pdm sync");
            for name in groups.iter().chain(&extras) {
                sync.push_str(" -G ");
                sync.push_str(name);
            }
            vec![
                "pdm venv create".to_string(),
                "pdm lock".to_string(),
                sync,
                "eval $(pdm venv activate)".to_string(),
            ]
        }
        PackageManager::Uv => {
            let mut sync = String::from("uv sync");
            for group in &groups {
                sync.push_str(" --group ");
                sync.push_str(group);
            }
            for extra in &extras {
                sync.push_str(" --extra ");
                sync.push_str(extra);
            }
            vec![
                "uv venv".to_string(),
                "uv lock".to_string(),
                sync,
                "source .venv/bin/activate".to_string(),
            ]
        }
    }
}

fn clean(names: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()) {
        if !name.is_empty() && name != Manifest::MAIN_GROUP && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

impl Manifest {
    /// Splits requested names into dependency groups and extras. A name
    /// declared both ways is selected both ways.
    pub fn install_selection(&self, names: &[String]) -> Result<InstallSelection, AppError> {
        let mut selection = InstallSelection::default();
        for name in names.iter().map(|n| n.trim()) {
            if name.is_empty() || name == Self::MAIN_GROUP {
                continue;
            }
            let origin = self
                .origins
                .get(name)
                .ok_or_else(|| ManifestError::UnknownGroup(name.to_string()))?;
            if origin.dependency_group {
                selection.groups.push(name.to_string());
            }
            if origin.extra {
                selection.extras.push(name.to_string());
            }
        }
        Ok(selection)
    }

    /// Setup commands installing the main set plus `names`.
    pub fn setup_commands(
        &self,
        manager: PackageManager,
        names: &[String],
    ) -> Result<Vec<String>, AppError> {
        Ok(selection_commands(manager, &self.install_selection(names)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_poetry_commands() {
        let commands = setup_commands(PackageManager::Poetry, &groups(&["testing", "linting"]));
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[2], "poetry install --with testing,linting");
    }

    #[test]
    fn test_pdm_commands() {
        let commands = setup_commands(PackageManager::Pdm, &groups(&["testing"]));
        assert_eq!(commands[0], "pdm venv create");
        assert_eq!(commands[2], "pdm sync -G testing");
    }

    #[test]
    fn test_uv_commands_without_groups() {
        let commands = setup_commands(PackageManager::Uv, &[]);
        assert_eq!(
            commands,
            vec!["uv venv", "uv lock", "uv sync", "source .venv/bin/activate"]
        );
    }

    #[test]
    fn test_main_group_is_implicit() {
        let commands = setup_commands(PackageManager::Uv, &groups(&["main", " ", "tools"]));
        assert_eq!(commands[2], "uv sync --group tools");
    }

    #[test]
    fn test_extras_use_extra_flags() {
        let selection = InstallSelection {
            groups: groups(&["testing"]),
            extras: groups(&["redis"]),
        };
        assert_eq!(
            selection_commands(PackageManager::Uv, &selection)[2],
            "uv sync --group testing --extra redis"
        );
        assert_eq!(
            selection_commands(PackageManager::Poetry, &selection)[2],
            "poetry install --with testing -E redis"
        );
        assert_eq!(
            selection_commands(PackageManager::Pdm, &selection)[2],
            "pdm sync -G testing -G redis"
        );
    }

    #[test]
    fn test_install_selection_classifies_names() {
        let mut manifest = Manifest::new(super::super::ProjectMetadata::new("demo"));
        manifest.extend_group("testing", []);
        manifest.extend_extra("redis", []);

        let selection = manifest
            .install_selection(&groups(&["main", "redis", "testing"]))
            .unwrap();
        assert_eq!(selection.groups, vec!["testing"]);
        assert_eq!(selection.extras, vec!["redis"]);

        let err = manifest.install_selection(&groups(&["docs"])).unwrap_err();
        assert!(matches!(
            err,
            AppError::Manifest(ManifestError::UnknownGroup(name)) if name == "docs"
        ));
    }
}
