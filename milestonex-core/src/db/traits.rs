//! Database abstraction traits
//!
//! This module defines the core trait that all storage backends must implement.

use anyhow::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::{Allocation, Epic, Milestone, ProjectAnalysis};
use crate::project::{NewTask, PlanStore, Project, TaskRecord, TaskUpdate};

/// Types of database backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// YAML file storage (single file)
    Yaml,
    /// SQLite database storage
    Sqlite,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Yaml => write!(f, "YAML"),
            BackendType::Sqlite => write!(f, "SQLite"),
        }
    }
}

impl BackendType {
    /// Infer the backend from a file extension; anything unknown is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => BackendType::Sqlite,
            _ => BackendType::Yaml,
        }
    }
}

/// Configuration for database backends
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub backend_type: BackendType,
}

impl DatabaseConfig {
    /// Config for `path` with the backend inferred from its extension
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backend_type = BackendType::from_path(&path);
        Self { path, backend_type }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::project::DEFAULT_DB_FILE),
            backend_type: BackendType::Yaml,
        }
    }
}

/// Core trait for database backends
///
/// `load()` and `save()` move the whole `PlanStore`. The CRUD operations
/// default to load-modify-save; backends with row-level access override
/// the hot ones.
pub trait DatabaseBackend: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn path(&self) -> &Path;

    // =========================================================================
    // Full Store Operations
    // =========================================================================

    fn load(&self) -> Result<PlanStore>;

    fn save(&self, store: &PlanStore) -> Result<()>;

    // =========================================================================
    // Project Operations
    // =========================================================================

    /// Persist an analysis as a new project. Existing projects are never
    /// regenerated.
    fn add_analysis(&self, name: &str, srs_text: &str, analysis: &ProjectAnalysis) -> Result<Project> {
        let mut store = self.load()?;
        let project = store.add_analysis(name, srs_text, analysis);
        self.save(&store)?;
        Ok(project)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.load()?.projects)
    }

    /// Resolve a project by id or unique id prefix
    fn find_project(&self, key: &str) -> Result<Project> {
        let store = self.load()?;
        store
            .find_project(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Project not found: {}", key))
    }

    /// A project's tasks regrouped into epics
    fn get_epics(&self, project_id: &Uuid) -> Result<Vec<Epic>> {
        Ok(self.load()?.epics_for(project_id))
    }

    fn list_milestones(&self, project_id: &Uuid) -> Result<Vec<Milestone>> {
        Ok(self.load()?.milestones_for(project_id))
    }

    // =========================================================================
    // Task CRUD Operations
    // =========================================================================

    fn list_tasks(&self, project_id: Option<&Uuid>) -> Result<Vec<TaskRecord>> {
        let store = self.load()?;
        Ok(store.tasks_for(project_id).into_iter().cloned().collect())
    }

    fn get_task(&self, id: &Uuid) -> Result<Option<TaskRecord>> {
        Ok(self.load()?.get_task(id).cloned())
    }

    /// Resolve a task by id or unique id prefix
    fn find_task(&self, key: &str) -> Result<TaskRecord> {
        let store = self.load()?;
        store
            .find_task(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Task not found: {}", key))
    }

    fn add_task(&self, new_task: NewTask) -> Result<TaskRecord> {
        let mut store = self.load()?;
        let record = store.add_task(new_task)?;
        self.save(&store)?;
        Ok(record)
    }

    fn update_task(&self, id: &Uuid, update: &TaskUpdate) -> Result<TaskRecord> {
        let mut store = self.load()?;
        let record = store.update_task(id, update)?;
        self.save(&store)?;
        Ok(record)
    }

    fn delete_task(&self, id: &Uuid) -> Result<TaskRecord> {
        let mut store = self.load()?;
        let removed = store.delete_task(id)?;
        self.save(&store)?;
        Ok(removed)
    }

    /// Record allocations on a project's tasks; returns the number applied
    fn apply_allocations(&self, project_id: &Uuid, allocations: &[Allocation]) -> Result<usize> {
        let mut store = self.load()?;
        let applied = store.apply_allocations(project_id, allocations);
        self.save(&store)?;
        Ok(applied)
    }

    // =========================================================================
    // Utility Operations
    // =========================================================================

    fn exists(&self) -> bool {
        self.path().exists()
    }

    fn create_if_not_exists(&self) -> Result<()> {
        if !self.exists() {
            self.save(&PlanStore::new())?;
        }
        Ok(())
    }

    fn stats(&self) -> Result<DatabaseStats> {
        let store = self.load()?;
        Ok(DatabaseStats {
            project_count: store.projects.len(),
            task_count: store.tasks.len(),
            milestone_count: store.milestones.len(),
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub project_count: usize,
    pub task_count: usize,
    pub milestone_count: usize,
    pub backend_type: BackendType,
}
