//! SQLite database storage backend
//!
//! Stores projects, tasks and milestones in relational tables. Whole-store
//! `save()` replaces everything in one transaction; single-task reads and
//! writes go straight to their rows.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::traits::{BackendType, DatabaseBackend};
use crate::models::{normalize_name, TaskStatus};
use crate::project::{MilestoneRecord, PlanStore, Project, TaskRecord, TaskUpdate};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const TASK_COLUMNS: &str = "id, project_id, epic_name, epic_description, task_name, \
                            timeline_days, status, sequence, assigned_to";

pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        let current_version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(include_str!("schema.sql"))?;
        } else if current_version < SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
        Uuid::parse_str(s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
        let id: String = row.get(0)?;
        let project_id: String = row.get(1)?;
        let status: String = row.get(6)?;
        Ok(TaskRecord {
            id: Self::parse_uuid(&id)?,
            project_id: Self::parse_uuid(&project_id)?,
            epic_name: row.get(2)?,
            epic_description: row.get(3)?,
            task_name: row.get(4)?,
            timeline_days: row.get(5)?,
            status: TaskStatus::parse(&status).unwrap_or_default(),
            sequence: row.get(7)?,
            assigned_to: row.get(8)?,
        })
    }

    fn load_projects(conn: &Connection) -> Result<Vec<Project>> {
        let mut stmt =
            conn.prepare("SELECT id, name, srs_text, created_at FROM projects ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let created_at: String = row.get(3)?;
            Ok((id, row.get::<_, String>(1)?, row.get::<_, String>(2)?, created_at))
        })?;

        let mut projects = Vec::new();
        for row in rows {
            let (id, name, srs_text, created_at) = row?;
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .with_context(|| format!("Bad created_at for project {}", id))?;
            projects.push(Project {
                id: Uuid::parse_str(&id).with_context(|| format!("Bad project id {}", id))?,
                name,
                srs_text,
                created_at,
            });
        }
        Ok(projects)
    }

    fn load_tasks(conn: &Connection, project_id: Option<&Uuid>) -> Result<Vec<TaskRecord>> {
        let tasks = match project_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY position",
                    TASK_COLUMNS
                ))?;
                let rows = stmt.query_map([id.to_string()], Self::task_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM tasks ORDER BY position", TASK_COLUMNS))?;
                let rows = stmt.query_map([], Self::task_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(tasks)
    }

    fn load_milestones(conn: &Connection) -> Result<Vec<MilestoneRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, description, timeline_days FROM milestones ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let project_id: String = row.get(1)?;
            Ok(MilestoneRecord {
                id: Self::parse_uuid(&id)?,
                project_id: Self::parse_uuid(&project_id)?,
                name: row.get(2)?,
                description: row.get(3)?,
                timeline_days: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn save_task(conn: &Connection, task: &TaskRecord, position: usize) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO tasks
             (id, project_id, epic_name, epic_description, task_name, timeline_days,
              status, sequence, assigned_to, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.id.to_string(),
                task.project_id.to_string(),
                task.epic_name,
                task.epic_description,
                task.task_name,
                task.timeline_days,
                task.status.to_string(),
                task.sequence,
                task.assigned_to,
                position as i64,
            ],
        )?;
        Ok(())
    }
}

impl DatabaseBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PlanStore> {
        let conn = self.conn()?;
        Ok(PlanStore {
            projects: Self::load_projects(&conn)?,
            tasks: Self::load_tasks(&conn, None)?,
            milestones: Self::load_milestones(&conn)?,
        })
    }

    fn save(&self, store: &PlanStore) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM milestones", [])?;
        tx.execute("DELETE FROM tasks", [])?;
        tx.execute("DELETE FROM projects", [])?;

        for project in &store.projects {
            tx.execute(
                "INSERT INTO projects (id, name, srs_text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    project.id.to_string(),
                    project.name,
                    project.srs_text,
                    project.created_at.to_rfc3339(),
                ],
            )?;
        }
        for (position, task) in store.tasks.iter().enumerate() {
            Self::save_task(&tx, task, position)?;
        }
        for (position, milestone) in store.milestones.iter().enumerate() {
            tx.execute(
                "INSERT INTO milestones (id, project_id, name, description, timeline_days, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    milestone.id.to_string(),
                    milestone.project_id.to_string(),
                    milestone.name,
                    milestone.description,
                    milestone.timeline_days,
                    position as i64,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // Row-level overrides

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        Self::load_projects(&conn)
    }

    fn list_tasks(&self, project_id: Option<&Uuid>) -> Result<Vec<TaskRecord>> {
        let conn = self.conn()?;
        Self::load_tasks(&conn, project_id)
    }

    fn get_task(&self, id: &Uuid) -> Result<Option<TaskRecord>> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                [id.to_string()],
                Self::task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn update_task(&self, id: &Uuid, update: &TaskUpdate) -> Result<TaskRecord> {
        let mut task = self
            .get_task(id)?
            .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
        update.apply(&mut task)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE tasks SET task_name = ?1, timeline_days = ?2, status = ?3, assigned_to = ?4
             WHERE id = ?5",
            params![
                task.task_name,
                task.timeline_days,
                task.status.to_string(),
                task.assigned_to,
                id.to_string(),
            ],
        )?;
        Ok(task)
    }

    fn delete_task(&self, id: &Uuid) -> Result<TaskRecord> {
        let removed = self
            .get_task(id)?
            .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tasks WHERE id = ?1", [id.to_string()])?;

        let epic = normalize_name(&removed.epic_name);
        let mut siblings: Vec<TaskRecord> = Self::load_tasks(&tx, Some(&removed.project_id))?
            .into_iter()
            .filter(|t| normalize_name(&t.epic_name) == epic)
            .collect();
        siblings.sort_by_key(|t| t.sequence);
        for (i, task) in siblings.iter().enumerate() {
            tx.execute(
                "UPDATE tasks SET sequence = ?1 WHERE id = ?2",
                params![i as u32 + 1, task.id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Epic, Milestone, ProjectAnalysis, Task};
    use tempfile::TempDir;

    fn backend() -> (TempDir, SqliteBackend) {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(dir.path().join("plan.db")).unwrap();
        (dir, backend)
    }

    fn analysis() -> ProjectAnalysis {
        let mut epic = Epic::new("Auth", "Login things");
        epic.tasks.push(Task::new("Login", 2, 1));
        epic.tasks.push(Task::new("Register", 3, 2));
        epic.tasks.push(Task::new("Reset", 1, 3));
        ProjectAnalysis {
            epics: vec![epic],
            milestones: vec![Milestone {
                name: "Auth done".to_string(),
                description: String::new(),
                timeline_days: 6,
            }],
        }
    }

    #[test]
    fn test_sqlite_round_trip() {
        let (_dir, backend) = backend();
        let project = backend.add_analysis("Demo", "srs", &analysis()).unwrap();

        let store = backend.load().unwrap();
        assert_eq!(store.projects.len(), 1);
        assert_eq!(store.tasks.len(), 3);
        assert_eq!(backend.get_epics(&project.id).unwrap(), analysis().epics);
        assert_eq!(backend.list_milestones(&project.id).unwrap(), analysis().milestones);
    }

    #[test]
    fn test_sqlite_update_and_delete() {
        let (_dir, backend) = backend();
        let project = backend.add_analysis("Demo", "srs", &analysis()).unwrap();
        let tasks = backend.list_tasks(Some(&project.id)).unwrap();

        let updated = backend
            .update_task(
                &tasks[0].id,
                &TaskUpdate {
                    status: Some(TaskStatus::Progress),
                    assigned_to: Some("Rahul".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Progress);
        assert_eq!(
            backend.get_task(&tasks[0].id).unwrap().unwrap().assigned_to.as_deref(),
            Some("Rahul")
        );

        backend.delete_task(&tasks[1].id).unwrap();
        let remaining = backend.list_tasks(Some(&project.id)).unwrap();
        let seqs: Vec<u32> = remaining.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(backend.delete_task(&tasks[1].id).is_err());
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.db");
        {
            let backend = SqliteBackend::new(&path).unwrap();
            backend.add_analysis("Demo", "srs", &analysis()).unwrap();
        }
        let reopened = SqliteBackend::new(&path).unwrap();
        assert_eq!(reopened.list_projects().unwrap().len(), 1);
    }
}
