use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Normalizes an epic or person name for identity comparisons
/// (trimmed, case-folded).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Kanban column of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    #[default]
    Backlog,
    Progress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Backlog => write!(f, "Backlog"),
            TaskStatus::Progress => write!(f, "Progress"),
            TaskStatus::Done => write!(f, "Done"),
        }
    }
}

impl TaskStatus {
    /// All statuses in board order
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Backlog, TaskStatus::Progress, TaskStatus::Done];

    /// Parse a status leniently, accepting the spellings models and users tend to produce.
    /// Returns `None` for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match key.as_str() {
            "backlog" | "todo" | "pending" | "open" | "new" | "notstarted" => {
                Some(TaskStatus::Backlog)
            }
            "progress" | "inprogress" | "doing" | "started" | "wip" | "active" => {
                Some(TaskStatus::Progress)
            }
            "done" | "complete" | "completed" | "finished" | "closed" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// A unit of work inside an epic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub task_name: String,
    pub timeline_days: u32,
    #[serde(default)]
    pub status: TaskStatus,
    pub sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl Task {
    /// Creates a backlog task with the given position
    pub fn new(task_name: impl Into<String>, timeline_days: u32, sequence: u32) -> Self {
        Self {
            task_name: task_name.into(),
            timeline_days,
            status: TaskStatus::Backlog,
            sequence,
            assigned_to: None,
        }
    }

    /// Assigns the task to a person. Reassignment replaces the previous
    /// assignee; there is no transition back to unassigned.
    pub fn assign(&mut self, person: impl Into<String>) {
        self.assigned_to = Some(person.into());
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to.is_some()
    }
}

/// A named grouping of related tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Epic {
    pub epic_name: String,
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Epic {
    pub fn new(epic_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            epic_name: epic_name.into(),
            description: description.into(),
            tasks: Vec::new(),
        }
    }

    /// Identity used when merging epics from different batches
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.epic_name)
    }

    /// Sum of all task timelines, saturating at `u32::MAX`
    pub fn total_days(&self) -> u32 {
        self.tasks
            .iter()
            .fold(0u32, |acc, t| acc.saturating_add(t.timeline_days))
    }

    /// Renumbers task sequences 1..N in current order
    pub fn renumber(&mut self) {
        for (i, task) in self.tasks.iter_mut().enumerate() {
            task.sequence = i as u32 + 1;
        }
    }
}

/// A checkpoint measured in days from project start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Milestone {
    pub name: String,
    pub description: String,
    pub timeline_days: u32,
}

/// A person tasks can be allocated to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMember {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    pub availability_days: u32,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, availability_days: u32) -> Self {
        Self {
            name: name.into(),
            role: String::new(),
            skills: BTreeSet::new(),
            availability_days,
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }
}

/// The allocator's view of a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskView {
    pub task_name: String,
    pub timeline_days: u32,
    pub epic_name: String,
}

impl TaskView {
    /// Flattens epics into allocator task views, in epic then sequence order
    pub fn from_epics(epics: &[Epic]) -> Vec<TaskView> {
        epics
            .iter()
            .flat_map(|epic| {
                epic.tasks.iter().map(move |task| TaskView {
                    task_name: task.task_name.clone(),
                    timeline_days: task.timeline_days,
                    epic_name: epic.epic_name.clone(),
                })
            })
            .collect()
    }
}

/// Assignment of one task to one team member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub task_name: String,
    pub assigned_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_name: Option<String>,
    #[serde(default)]
    pub timeline_days: u32,
}

/// A bounded slice of SRS text used as one unit of model input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Epics and milestones produced from one SRS document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectAnalysis {
    pub epics: Vec<Epic>,
    pub milestones: Vec<Milestone>,
}

impl ProjectAnalysis {
    pub fn task_count(&self) -> usize {
        self.epics.iter().map(|e| e.tasks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_variants() {
        assert_eq!(TaskStatus::parse("Backlog"), Some(TaskStatus::Backlog));
        assert_eq!(TaskStatus::parse("to do"), Some(TaskStatus::Backlog));
        assert_eq!(TaskStatus::parse("In Progress"), Some(TaskStatus::Progress));
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::Progress));
        assert_eq!(TaskStatus::parse("completed"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::parse("blocked"), None);
    }

    #[test]
    fn test_task_serializes_canonical_field_names() {
        let task = Task::new("Build login", 3, 1);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task_name"], "Build login");
        assert_eq!(json["timeline_days"], 3);
        assert_eq!(json["status"], "Backlog");
        assert_eq!(json["sequence"], 1);
        assert!(json.get("assigned_to").is_none());
    }

    #[test]
    fn test_reassignment_never_clears() {
        let mut task = Task::new("Deploy", 2, 1);
        assert!(!task.is_assigned());
        task.assign("Prerna");
        task.assign("Rahul");
        assert_eq!(task.assigned_to.as_deref(), Some("Rahul"));
    }

    #[test]
    fn test_epic_renumber_and_identity() {
        let mut epic = Epic::new("  User Management ", "Users");
        epic.tasks.push(Task::new("a", 1, 7));
        epic.tasks.push(Task::new("b", 2, 3));
        epic.renumber();
        assert_eq!(epic.tasks[0].sequence, 1);
        assert_eq!(epic.tasks[1].sequence, 2);
        assert_eq!(epic.normalized_name(), "user management");
        assert_eq!(epic.total_days(), 3);
    }

    #[test]
    fn test_total_days_saturates() {
        let mut epic = Epic::new("Big", "");
        epic.tasks.push(Task::new("forever", u32::MAX, 1));
        epic.tasks.push(Task::new("and a bit", 5, 2));
        assert_eq!(epic.total_days(), u32::MAX);
    }

    #[test]
    fn test_task_views_follow_epic_order() {
        let mut a = Epic::new("A", "");
        a.tasks.push(Task::new("a1", 1, 1));
        let mut b = Epic::new("B", "");
        b.tasks.push(Task::new("b1", 4, 1));
        let views = TaskView::from_epics(&[a, b]);
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].epic_name, "B");
        assert_eq!(views[1].timeline_days, 4);
    }
}
