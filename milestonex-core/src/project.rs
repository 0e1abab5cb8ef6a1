//! Persisted projects, tasks and milestones
//!
//! A project is created once per analyzed SRS document. Its epics are
//! flattened into task records that carry the project id; afterwards tasks
//! change only through explicit CRUD or allocation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;

use crate::ai::reconcile::TimelineLimits;
use crate::models::{normalize_name, Allocation, Epic, Milestone, ProjectAnalysis, Task, TaskStatus, TaskView};

/// Environment variable naming the database file
pub const ENV_DB_PATH: &str = "MILESTONEX_DB";
pub const DEFAULT_DB_FILE: &str = "milestonex.yaml";

/// Hand-edited timelines obey the same bounds as reconciled ones
fn check_timeline(days: u32) -> Result<()> {
    let ceiling = TimelineLimits::default().task_ceiling;
    if days == 0 || days >= ceiling {
        anyhow::bail!("timeline_days must be between 1 and {}", ceiling - 1);
    }
    Ok(())
}

/// One analyzed SRS document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub srs_text: String,
    pub created_at: DateTime<Utc>,
}

/// A task as stored, with its owning project and epic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub epic_name: String,
    #[serde(default)]
    pub epic_description: String,
    pub task_name: String,
    pub timeline_days: u32,
    #[serde(default)]
    pub status: TaskStatus,
    pub sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl TaskRecord {
    pub fn to_task(&self) -> Task {
        Task {
            task_name: self.task_name.clone(),
            timeline_days: self.timeline_days,
            status: self.status,
            sequence: self.sequence,
            assigned_to: self.assigned_to.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MilestoneRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timeline_days: u32,
}

impl MilestoneRecord {
    pub fn to_milestone(&self) -> Milestone {
        Milestone {
            name: self.name.clone(),
            description: self.description.clone(),
            timeline_days: self.timeline_days,
        }
    }
}

/// A task created by hand rather than by analysis
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub project_id: Uuid,
    pub epic_name: String,
    pub task_name: String,
    pub timeline_days: u32,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
}

/// Partial update of a task; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub task_name: Option<String>,
    pub timeline_days: Option<u32>,
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.task_name.is_none()
            && self.timeline_days.is_none()
            && self.status.is_none()
            && self.assigned_to.is_none()
    }

    /// Validate and apply to a record. Nothing changes when any field is invalid.
    pub fn apply(&self, task: &mut TaskRecord) -> Result<()> {
        if matches!(&self.task_name, Some(name) if name.trim().is_empty()) {
            anyhow::bail!("Task name must not be empty");
        }
        if let Some(days) = self.timeline_days {
            check_timeline(days)?;
        }
        if matches!(&self.assigned_to, Some(person) if person.trim().is_empty()) {
            anyhow::bail!("Assignee must not be empty");
        }

        if let Some(name) = &self.task_name {
            task.task_name = name.trim().to_string();
        }
        if let Some(days) = self.timeline_days {
            task.timeline_days = days;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(person) = &self.assigned_to {
            task.assigned_to = Some(person.trim().to_string());
        }
        Ok(())
    }
}

/// Everything MilestoneX persists
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanStore {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub milestones: Vec<MilestoneRecord>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an analysis as a new project and return it
    pub fn add_analysis(&mut self, name: &str, srs_text: &str, analysis: &ProjectAnalysis) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            srs_text: srs_text.to_string(),
            created_at: Utc::now(),
        };

        for epic in &analysis.epics {
            for task in &epic.tasks {
                self.tasks.push(TaskRecord {
                    id: Uuid::new_v4(),
                    project_id: project.id,
                    epic_name: epic.epic_name.clone(),
                    epic_description: epic.description.clone(),
                    task_name: task.task_name.clone(),
                    timeline_days: task.timeline_days,
                    status: task.status,
                    sequence: task.sequence,
                    assigned_to: task.assigned_to.clone(),
                });
            }
        }
        for milestone in &analysis.milestones {
            self.milestones.push(MilestoneRecord {
                id: Uuid::new_v4(),
                project_id: project.id,
                name: milestone.name.clone(),
                description: milestone.description.clone(),
                timeline_days: milestone.timeline_days,
            });
        }

        self.projects.push(project.clone());
        project
    }

    pub fn get_project(&self, id: &Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| &p.id == id)
    }

    /// Find a project by full id or unambiguous id prefix
    pub fn find_project(&self, key: &str) -> Option<&Project> {
        if let Ok(id) = Uuid::parse_str(key) {
            return self.get_project(&id);
        }
        let key = key.to_lowercase();
        let mut matches = self
            .projects
            .iter()
            .filter(|p| p.id.to_string().starts_with(&key));
        match (matches.next(), matches.next()) {
            (Some(project), None) => Some(project),
            _ => None,
        }
    }

    /// Tasks of a project (or all projects) in stored order
    pub fn tasks_for(&self, project_id: Option<&Uuid>) -> Vec<&TaskRecord> {
        self.tasks
            .iter()
            .filter(|t| project_id.map_or(true, |id| &t.project_id == id))
            .collect()
    }

    pub fn get_task(&self, id: &Uuid) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Find a task by full id or unambiguous id prefix
    pub fn find_task(&self, key: &str) -> Option<&TaskRecord> {
        if let Ok(id) = Uuid::parse_str(key) {
            return self.get_task(&id);
        }
        let key = key.to_lowercase();
        let mut matches = self.tasks.iter().filter(|t| t.id.to_string().starts_with(&key));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Some(task),
            _ => None,
        }
    }

    /// Add a task at the end of its epic. An epic matching by normalized
    /// name keeps its stored spelling and description.
    pub fn add_task(&mut self, new_task: NewTask) -> Result<TaskRecord> {
        if self.get_project(&new_task.project_id).is_none() {
            anyhow::bail!("Project not found: {}", new_task.project_id);
        }
        if new_task.task_name.trim().is_empty() {
            anyhow::bail!("Task name must not be empty");
        }
        check_timeline(new_task.timeline_days)?;

        let wanted = normalize_name(&new_task.epic_name);
        let siblings: Vec<&TaskRecord> = self
            .tasks
            .iter()
            .filter(|t| t.project_id == new_task.project_id && normalize_name(&t.epic_name) == wanted)
            .collect();
        let (epic_name, epic_description) = siblings
            .first()
            .map(|t| (t.epic_name.clone(), t.epic_description.clone()))
            .unwrap_or_else(|| (new_task.epic_name.trim().to_string(), String::new()));
        let sequence = siblings.iter().map(|t| t.sequence).max().unwrap_or(0) + 1;

        let record = TaskRecord {
            id: Uuid::new_v4(),
            project_id: new_task.project_id,
            epic_name,
            epic_description,
            task_name: new_task.task_name.trim().to_string(),
            timeline_days: new_task.timeline_days,
            status: new_task.status,
            sequence,
            assigned_to: new_task.assigned_to,
        };
        self.tasks.push(record.clone());
        Ok(record)
    }

    /// Apply a partial update. Assignment can change but never clear.
    pub fn update_task(&mut self, id: &Uuid, update: &TaskUpdate) -> Result<TaskRecord> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
        update.apply(task)?;
        Ok(task.clone())
    }

    /// Delete a task and close the gap in its epic's sequence
    pub fn delete_task(&mut self, id: &Uuid) -> Result<TaskRecord> {
        let pos = self
            .tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
        let removed = self.tasks.remove(pos);

        let epic = normalize_name(&removed.epic_name);
        let mut siblings: Vec<&mut TaskRecord> = self
            .tasks
            .iter_mut()
            .filter(|t| t.project_id == removed.project_id && normalize_name(&t.epic_name) == epic)
            .collect();
        siblings.sort_by_key(|t| t.sequence);
        for (i, task) in siblings.into_iter().enumerate() {
            task.sequence = i as u32 + 1;
        }
        Ok(removed)
    }

    /// Regroup a project's tasks into epics, in first-seen epic order and
    /// sequence order within each epic
    pub fn epics_for(&self, project_id: &Uuid) -> Vec<Epic> {
        let mut epics: Vec<Epic> = Vec::new();
        for record in self.tasks.iter().filter(|t| &t.project_id == project_id) {
            let key = normalize_name(&record.epic_name);
            match epics.iter_mut().find(|e| e.normalized_name() == key) {
                Some(epic) => epic.tasks.push(record.to_task()),
                None => {
                    let mut epic = Epic::new(record.epic_name.clone(), record.epic_description.clone());
                    epic.tasks.push(record.to_task());
                    epics.push(epic);
                }
            }
        }
        for epic in &mut epics {
            epic.tasks.sort_by_key(|t| t.sequence);
        }
        epics
    }

    pub fn milestones_for(&self, project_id: &Uuid) -> Vec<Milestone> {
        let mut milestones: Vec<Milestone> = self
            .milestones
            .iter()
            .filter(|m| &m.project_id == project_id)
            .map(MilestoneRecord::to_milestone)
            .collect();
        milestones.sort_by_key(|m| m.timeline_days);
        milestones
    }

    /// The allocator's view of a project's tasks
    pub fn task_views(&self, project_id: &Uuid) -> Vec<TaskView> {
        TaskView::from_epics(&self.epics_for(project_id))
    }

    /// Record allocations against a project's tasks. Returns how many tasks
    /// were assigned; unknown task names are ignored.
    pub fn apply_allocations(&mut self, project_id: &Uuid, allocations: &[Allocation]) -> usize {
        let mut applied = 0;
        let mut claimed: HashSet<Uuid> = HashSet::new();
        for allocation in allocations {
            let wanted = normalize_name(&allocation.task_name);
            let epic_hint = allocation.epic_name.as_deref().map(normalize_name);
            let candidates: Vec<usize> = (0..self.tasks.len())
                .filter(|&i| {
                    let t = &self.tasks[i];
                    &t.project_id == project_id
                        && normalize_name(&t.task_name) == wanted
                        && epic_hint
                            .as_ref()
                            .map_or(true, |hint| normalize_name(&t.epic_name) == *hint)
                })
                .collect();
            // Repeated names go to the first task not yet allocated in this batch
            let target = candidates
                .iter()
                .copied()
                .find(|&i| !claimed.contains(&self.tasks[i].id))
                .or_else(|| candidates.first().copied());
            match target {
                Some(i) => {
                    let task = &mut self.tasks[i];
                    task.assigned_to = Some(allocation.assigned_to.clone());
                    claimed.insert(task.id);
                    applied += 1;
                }
                None => log::warn!("No task named '{}' to allocate", allocation.task_name),
            }
        }
        applied
    }
}

/// Determine the database path: explicit argument, then `$MILESTONEX_DB`,
/// then `milestonex.yaml` in the current directory
pub fn determine_db_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}
