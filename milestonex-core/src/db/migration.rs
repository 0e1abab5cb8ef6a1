//! Migration utilities for converting between storage backends
//!
//! Moves a plan store between YAML and SQLite, and to or from JSON for
//! interoperability and backups.

use anyhow::{Context, Result};
use std::path::Path;

use super::create_backend;
use super::traits::DatabaseBackend;
use crate::project::PlanStore;

/// Copies everything from one backend into another, replacing the
/// destination's contents. Returns the number of tasks copied.
pub fn migrate(source: &dyn DatabaseBackend, dest: &dyn DatabaseBackend) -> Result<usize> {
    let store = source
        .load()
        .with_context(|| format!("Failed to load {} database", source.backend_type()))?;
    let count = store.tasks.len();
    dest.save(&store)
        .with_context(|| format!("Failed to save to {} database", dest.backend_type()))?;
    Ok(count)
}

/// Writes a plan store to a JSON file
pub fn export_to_json<P: AsRef<Path>>(store: &PlanStore, json_path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(store).context("Failed to serialize to JSON")?;
    std::fs::write(json_path, json).context("Failed to write JSON file")?;
    Ok(())
}

/// Reads a plan store from a JSON file
pub fn import_from_json<P: AsRef<Path>>(json_path: P) -> Result<PlanStore> {
    let json = std::fs::read_to_string(json_path).context("Failed to read JSON file")?;
    let store: PlanStore = serde_json::from_str(&json).context("Failed to parse JSON")?;
    Ok(store)
}

pub fn export_backend_to_json<P: AsRef<Path>>(backend: &dyn DatabaseBackend, json_path: P) -> Result<()> {
    let store = backend.load()?;
    export_to_json(&store, json_path)
}

pub fn import_json_to_backend<P: AsRef<Path>>(json_path: P, backend: &dyn DatabaseBackend) -> Result<()> {
    let store = import_from_json(json_path)?;
    backend.save(&store)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Copies the store at `source` into `dest`, picking each side's format
/// from its extension. A `.json` source is imported, a `.json` destination
/// is exported, anything else goes through [`migrate`]. Returns the number
/// of tasks copied.
pub fn migrate_files(source: &Path, dest: &Path) -> Result<usize> {
    if is_json(source) && is_json(dest) {
        anyhow::bail!("Source and destination cannot both be JSON");
    }

    if is_json(source) {
        let store = import_from_json(source)
            .with_context(|| format!("Failed to import {}", source.display()))?;
        let target = create_backend(dest, None)?;
        target.save(&store)?;
        return Ok(store.tasks.len());
    }

    let backend = create_backend(source, None)?;
    backend.create_if_not_exists()?;
    if is_json(dest) {
        let store = backend.load()?;
        export_to_json(&store, dest)?;
        return Ok(store.tasks.len());
    }

    let target = create_backend(dest, None)?;
    migrate(backend.as_ref(), target.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteBackend, YamlBackend};
    use crate::models::{Epic, ProjectAnalysis, Task};
    use tempfile::TempDir;

    fn analysis() -> ProjectAnalysis {
        let mut epic = Epic::new("Deployment", "Ship it");
        epic.tasks.push(Task::new("Provision server", 2, 1));
        epic.tasks.push(Task::new("Configure CI", 1, 2));
        ProjectAnalysis {
            epics: vec![epic],
            milestones: Vec::new(),
        }
    }

    #[test]
    fn test_yaml_to_sqlite_and_back() {
        let dir = TempDir::new().unwrap();
        let yaml = YamlBackend::new(dir.path().join("plan.yaml"));
        let project = yaml.add_analysis("Migration Test", "srs", &analysis()).unwrap();

        let sqlite = SqliteBackend::new(dir.path().join("plan.db")).unwrap();
        assert_eq!(migrate(&yaml, &sqlite).unwrap(), 2);
        assert_eq!(sqlite.get_epics(&project.id).unwrap(), analysis().epics);

        let back = YamlBackend::new(dir.path().join("back.yaml"));
        assert_eq!(migrate(&sqlite, &back).unwrap(), 2);
        let projects = back.list_projects().unwrap();
        assert_eq!(projects[0].name, "Migration Test");
    }

    #[test]
    fn test_json_export_import() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("export.json");

        let yaml = YamlBackend::new(dir.path().join("plan.yaml"));
        yaml.add_analysis("JSON Test", "srs", &analysis()).unwrap();
        export_backend_to_json(&yaml, &json_path).unwrap();

        let loaded = import_from_json(&json_path).unwrap();
        assert_eq!(loaded.projects[0].name, "JSON Test");
        assert_eq!(loaded.tasks.len(), 2);

        let target = YamlBackend::new(dir.path().join("imported.yaml"));
        import_json_to_backend(&json_path, &target).unwrap();
        assert_eq!(target.list_tasks(None).unwrap().len(), 2);
    }

    #[test]
    fn test_migrate_files_imports_json_source() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("backup.json");
        let yaml = YamlBackend::new(dir.path().join("plan.yaml"));
        let project = yaml.add_analysis("Restore", "srs", &analysis()).unwrap();

        assert_eq!(migrate_files(&dir.path().join("plan.yaml"), &json_path).unwrap(), 2);
        assert_eq!(migrate_files(&json_path, &dir.path().join("restored.db")).unwrap(), 2);

        let restored = SqliteBackend::new(dir.path().join("restored.db")).unwrap();
        assert_eq!(restored.get_epics(&project.id).unwrap(), analysis().epics);
        assert!(migrate_files(&json_path, &dir.path().join("copy.json")).is_err());
    }
}
