//! Database abstraction layer for MilestoneX
//!
//! Storage backends sit behind one trait, so the CLI works the same over a
//! YAML file or a SQLite database.

mod migration;
mod sqlite_backend;
mod traits;
mod yaml_backend;

pub use migration::{
    export_backend_to_json, export_to_json, import_from_json, import_json_to_backend, migrate,
    migrate_files,
};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, DatabaseBackend, DatabaseConfig, DatabaseStats};
pub use yaml_backend::YamlBackend;

use anyhow::Result;
use std::path::Path;

/// Creates a database backend based on the file extension or explicit type
pub fn create_backend(path: &Path, backend_type: Option<BackendType>) -> Result<Box<dyn DatabaseBackend>> {
    let bt = backend_type.unwrap_or_else(|| BackendType::from_path(path));

    match bt {
        BackendType::Yaml => Ok(Box::new(YamlBackend::new(path))),
        BackendType::Sqlite => Ok(Box::new(SqliteBackend::new(path)?)),
    }
}

/// Opens the backend described by a [`DatabaseConfig`]
pub fn open(config: &DatabaseConfig) -> Result<Box<dyn DatabaseBackend>> {
    let backend = create_backend(&config.path, Some(config.backend_type))?;
    backend.create_if_not_exists()?;
    Ok(backend)
}
