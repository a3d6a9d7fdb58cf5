//! Manifest parsing against complete pyproject files for each package manager.

use std::path::PathBuf;

use clean_architecture_boilerplate::domain::{
    AppError, Manifest, ManifestError, PackageManager, Severity,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> Manifest {
    Manifest::load(fixture(name)).unwrap()
}

#[test]
fn test_poetry_fixture() {
    let manifest = load("poetry.pyproject.toml");

    assert_eq!(manifest.manager, Some(PackageManager::Poetry));
    assert_eq!(manifest.project.name, "clean-architecture");
    assert_eq!(manifest.project.authors[0].email.as_deref(), Some("doankhiem.crazy@gmail.com"));
    assert!(manifest.project.requires_python.is_some());
    assert_eq!(manifest.dependencies.len(), 5);
    assert_eq!(
        manifest.group_names(),
        vec!["main", "linting", "testing", "tools"]
    );

    let sqlalchemy = manifest
        .dependencies
        .iter()
        .find(|r| r.normalized_name() == "sqlalchemy")
        .unwrap();
    assert_eq!(sqlalchemy.extras, vec!["asyncio"]);
    assert!(sqlalchemy.is_pinned());

    let issues = manifest.validate();
    assert!(!Manifest::has_errors(&issues));
    assert!(issues.iter().any(|i| i.location == "linting.mypy"));
    assert!(issues.iter().any(|i| i.location == "tools.httpx"));
}

#[test]
fn test_pdm_fixture_reports_duplicate() {
    let manifest = load("pdm.pyproject.toml");

    assert_eq!(manifest.manager, Some(PackageManager::Pdm));
    assert_eq!(manifest.project.license.as_deref(), Some("MIT"));
    assert_eq!(manifest.group("testing").unwrap().len(), 2);

    let tzdata = manifest
        .dependencies
        .iter()
        .find(|r| r.name == "tzdata")
        .unwrap();
    assert_eq!(tzdata.marker.as_deref(), Some("sys_platform == 'win32'"));

    let issues = manifest.validate();
    assert_eq!(issues[0].severity, Severity::Error);
    assert_eq!(issues[0].location, "linting.ruff");
    assert!(
        issues
            .iter()
            .any(|i| i.severity == Severity::Warning && i.location == "main.tzdata")
    );
}

#[test]
fn test_uv_fixture() {
    let manifest = load("uv.pyproject.toml");

    assert_eq!(manifest.manager, Some(PackageManager::Uv));
    assert_eq!(
        manifest.group_names(),
        vec!["main", "dev", "linting", "redis", "testing"]
    );
    assert_eq!(manifest.group("dev").unwrap().len(), 4);
    assert_eq!(manifest.requirement_count(), 4 + 4 + 2 + 1 + 2);
    assert!(manifest.validate().is_empty());
}

#[test]
fn test_poetry2_fixture_merges_project_dependencies() {
    let manifest = load("poetry2.pyproject.toml");

    assert_eq!(manifest.manager, Some(PackageManager::Poetry));
    assert_eq!(manifest.project.version.as_deref(), Some("0.2.0"));
    assert_eq!(manifest.dependencies.len(), 3);

    let asyncpg = manifest
        .dependencies
        .iter()
        .find(|r| r.name == "asyncpg")
        .unwrap();
    assert!(asyncpg.is_pinned());
    assert_eq!(asyncpg.marker.as_deref(), Some("sys_platform != 'win32'"));

    let pytest = &manifest.group("testing").unwrap()[0];
    assert_eq!(pytest.specifiers.0.len(), 2);

    assert!(manifest.origins["redis"].extra);
    assert!(manifest.origins["testing"].dependency_group);
    assert!(manifest.validate().is_empty());
}

#[test]
fn test_setup_commands_follow_detected_manager() {
    let groups = vec!["testing".to_string(), "linting".to_string()];

    let expected = [
        ("poetry.pyproject.toml", "poetry install --with testing,linting"),
        ("pdm.pyproject.toml", "pdm sync -G testing -G linting"),
        ("uv.pyproject.toml", "uv sync --group testing --group linting"),
    ];
    for (file, install) in expected {
        let manifest = load(file);
        let commands = manifest
            .setup_commands(manifest.manager.unwrap(), &groups)
            .unwrap();
        assert_eq!(commands[2], install, "{file}");
    }
}

#[test]
fn test_setup_commands_pass_extras_separately() {
    let names = vec!["testing".to_string(), "redis".to_string()];

    let manifest = load("uv.pyproject.toml");
    let commands = manifest.setup_commands(PackageManager::Uv, &names).unwrap();
    assert_eq!(commands[2], "uv sync --group testing --extra redis");
    let commands = manifest.setup_commands(PackageManager::Pdm, &names).unwrap();
    assert_eq!(commands[2], "pdm sync -G testing -G redis");

    let manifest = load("poetry2.pyproject.toml");
    let commands = manifest
        .setup_commands(PackageManager::Poetry, &names)
        .unwrap();
    assert_eq!(commands[2], "poetry install --with testing -E redis");
}

#[test]
fn test_setup_commands_reject_unknown_group() {
    let manifest = load("uv.pyproject.toml");
    let err = manifest
        .setup_commands(PackageManager::Uv, &["docs".to_string()])
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Manifest(ManifestError::UnknownGroup(name)) if name == "docs"
    ));
}

#[test]
fn test_missing_file() {
    let err = Manifest::load(fixture("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Manifest(ManifestError::Io { .. })));
}
