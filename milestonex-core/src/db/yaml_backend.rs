//! YAML file storage backend
//!
//! Stores everything in a single YAML file through [`Storage`], which
//! provides the file locking.

use anyhow::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::traits::{BackendType, DatabaseBackend};
use crate::models::{Allocation, ProjectAnalysis};
use crate::project::{NewTask, PlanStore, Project, TaskRecord, TaskUpdate};
use crate::storage::Storage;

pub struct YamlBackend {
    storage: Storage,
    path: PathBuf,
}

impl YamlBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            storage: Storage::new(&path),
            path,
        }
    }
}

// Mutations go through update_atomically so the read-modify-write happens
// under one exclusive lock.
impl DatabaseBackend for YamlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Yaml
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PlanStore> {
        self.storage.load()
    }

    fn save(&self, store: &PlanStore) -> Result<()> {
        self.storage.save(store)
    }

    fn add_analysis(&self, name: &str, srs_text: &str, analysis: &ProjectAnalysis) -> Result<Project> {
        self.storage
            .update_atomically(|store| Ok(store.add_analysis(name, srs_text, analysis)))
    }

    fn add_task(&self, new_task: NewTask) -> Result<TaskRecord> {
        self.storage.update_atomically(|store| store.add_task(new_task))
    }

    fn update_task(&self, id: &Uuid, update: &TaskUpdate) -> Result<TaskRecord> {
        self.storage.update_atomically(|store| store.update_task(id, update))
    }

    fn delete_task(&self, id: &Uuid) -> Result<TaskRecord> {
        self.storage.update_atomically(|store| store.delete_task(id))
    }

    fn apply_allocations(&self, project_id: &Uuid, allocations: &[Allocation]) -> Result<usize> {
        self.storage
            .update_atomically(|store| Ok(store.apply_allocations(project_id, allocations)))
    }
}
