//! Field Reconciliation Module
//!
//! Maps the keys models actually emit onto the canonical schema. Each entity
//! kind has a declarative alias table: canonical field name to the ordered
//! list of accepted source keys. A single lookup routine walks the table;
//! defaults and rejections are recorded in a [`ReconcileReport`].

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::estimator::TimelineEstimator;
use crate::models::{Epic, Milestone, Task, TaskStatus};

/// Canonical field name to accepted source keys, highest priority first
pub type AliasTable = &'static [(&'static str, &'static [&'static str])];

pub const EPIC_ALIASES: AliasTable = &[
    (
        "epic_name",
        &[
            "epic_name", "Epic Name", "Epic_Name", "epicName", "EpicName", "epic", "Epic", "name",
            "Name", "title", "Title",
        ],
    ),
    (
        "description",
        &[
            "description", "Description", "epic_description", "epicDescription", "desc",
            "summary",
        ],
    ),
    (
        "tasks",
        &["tasks", "Tasks", "task_list", "taskList", "items", "stories"],
    ),
];

pub const TASK_ALIASES: AliasTable = &[
    (
        "task_name",
        &[
            "task_name", "Task Name", "Task_Name", "taskName", "TaskName", "task", "Task", "name",
            "Name", "title", "Title",
        ],
    ),
    (
        "timeline_days",
        &[
            "timeline_days", "Timeline Days", "timelineDays", "timeline", "Timeline", "days",
            "Days", "duration_days", "duration", "estimated_days", "estimate",
        ],
    ),
    ("status", &["status", "Status", "state", "State"]),
    (
        "sequence",
        &["sequence", "Sequence", "seq", "order", "Order", "position"],
    ),
    (
        "assigned_to",
        &["assigned_to", "Assigned To", "assignedTo", "assignee", "Assignee", "owner"],
    ),
];

pub const MILESTONE_ALIASES: AliasTable = &[
    (
        "name",
        &[
            "name", "Name", "names", "milestone", "Milestone", "milestone_name", "milestoneName",
            "Milestone Name", "title", "Title",
        ],
    ),
    (
        "description",
        &[
            "description", "Description", "descriptions", "desc", "details", "summary",
        ],
    ),
    (
        "timeline_days",
        &[
            "timeline_days", "Timeline Days", "timelineDays", "timeline", "Timeline", "days",
            "Days", "target_days", "day",
        ],
    ),
];

pub const ALLOCATION_ALIASES: AliasTable = &[
    (
        "task_name",
        &[
            "task_name", "Task Name", "taskName", "TaskName", "task", "Task", "title", "name",
        ],
    ),
    (
        "assigned_to",
        &[
            "assigned_to", "Assigned To", "assignedTo", "AssignedTo", "assignee", "Assignee",
            "member", "team_member", "developer", "owner", "person",
        ],
    ),
    ("epic_name", &["epic_name", "Epic Name", "epicName", "epic"]),
    (
        "timeline_days",
        &["timeline_days", "timelineDays", "timeline", "days", "Days"],
    ),
];

/// Kind of entity being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Epic,
    Task,
    Milestone,
    Allocation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Epic => write!(f, "epic"),
            EntityKind::Task => write!(f, "task"),
            EntityKind::Milestone => write!(f, "milestone"),
            EntityKind::Allocation => write!(f, "allocation"),
        }
    }
}

/// An item excluded from output because a field violates an invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{entity} rejected: {reason}")]
pub struct ValidationRejection {
    pub entity: EntityKind,
    pub reason: String,
}

impl ValidationRejection {
    pub fn new(entity: EntityKind, reason: impl Into<String>) -> Self {
        Self {
            entity,
            reason: reason.into(),
        }
    }
}

/// A field that was filled in rather than read from the model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationDefault {
    pub entity: EntityKind,
    pub field: &'static str,
    pub value: String,
}

/// Defaults applied and items rejected during reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub defaults: Vec<ReconciliationDefault>,
    pub rejections: Vec<ValidationRejection>,
}

impl ReconcileReport {
    pub fn absorb(&mut self, other: ReconcileReport) {
        self.defaults.extend(other.defaults);
        self.rejections.extend(other.rejections);
    }
}

/// Sanity ceilings for timelines (exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineLimits {
    pub task_ceiling: u32,
    pub milestone_ceiling: u32,
}

impl Default for TimelineLimits {
    fn default() -> Self {
        Self {
            task_ceiling: 365,
            milestone_ceiling: 1000,
        }
    }
}

/// Look up a canonical field through an alias table.
///
/// Aliases are tried case-sensitively in priority order; the first present,
/// non-null, non-blank value wins. When no alias matches exactly, keys that
/// are an alias followed by digits (`name0`, `task_name1`) are accepted.
pub fn lookup<'a>(obj: &'a Map<String, Value>, table: AliasTable, field: &str) -> Option<&'a Value> {
    let aliases = table
        .iter()
        .find(|(canonical, _)| *canonical == field)
        .map(|(_, aliases)| *aliases)?;

    aliases
        .iter()
        .find_map(|alias| obj.get(*alias).filter(|v| is_present(v)))
        .or_else(|| {
            aliases.iter().find_map(|alias| {
                obj.iter()
                    .find(|(key, value)| has_numbered_suffix(key, alias) && is_present(value))
                    .map(|(_, value)| value)
            })
        })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn has_numbered_suffix(key: &str, alias: &str) -> bool {
    key.strip_prefix(alias)
        .map_or(false, |rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Coerce a scalar to trimmed text
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a value to an integer. Fractions round up; strings may carry a
/// unit suffix ("3 days").
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.ceil() as i64)),
        Value::String(s) => parse_leading_integer(s),
        _ => None,
    }
}

fn parse_leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    if let Ok(f) = s.parse::<f64>() {
        return f.is_finite().then(|| f.ceil() as i64);
    }
    let (sign, digits_from) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s),
    };
    let digits: String = digits_from.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok().map(|n| sign * n)
}

/// Reconciles parsed model output into canonical entities
pub struct Reconciler<'e> {
    estimator: &'e mut dyn TimelineEstimator,
    limits: TimelineLimits,
    report: ReconcileReport,
}

impl<'e> Reconciler<'e> {
    pub fn new(estimator: &'e mut dyn TimelineEstimator, limits: TimelineLimits) -> Self {
        Self {
            estimator,
            limits,
            report: ReconcileReport::default(),
        }
    }

    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }

    pub fn into_report(self) -> ReconcileReport {
        self.report
    }

    fn record_default(&mut self, entity: EntityKind, field: &'static str, value: impl ToString) {
        let value = value.to_string();
        log::debug!("Defaulted {} {} to {:?}", entity, field, value);
        self.report.defaults.push(ReconciliationDefault {
            entity,
            field,
            value,
        });
    }

    fn record_rejection(&mut self, rejection: ValidationRejection) {
        log::warn!("Dropping model output item: {}", rejection);
        self.report.rejections.push(rejection);
    }

    /// Reconcile a list of epic objects, dropping rejected ones
    pub fn reconcile_epics(&mut self, values: &[Value]) -> Vec<Epic> {
        let mut epics = Vec::with_capacity(values.len());
        for value in values {
            match self.reconcile_epic(value) {
                Ok(epic) => epics.push(epic),
                Err(rejection) => self.record_rejection(rejection),
            }
        }
        epics
    }

    /// Reconcile one epic object and its tasks. Rejected tasks are dropped
    /// from the epic; the epic itself is rejected only without a name.
    pub fn reconcile_epic(&mut self, value: &Value) -> Result<Epic, ValidationRejection> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationRejection::new(EntityKind::Epic, "not an object"))?;

        let epic_name = lookup(obj, EPIC_ALIASES, "epic_name")
            .and_then(as_text)
            .ok_or_else(|| ValidationRejection::new(EntityKind::Epic, "missing epic_name"))?;

        let description = match lookup(obj, EPIC_ALIASES, "description").and_then(as_text) {
            Some(description) => description,
            None => {
                let synthesized = format!("Implementation of {} module.", epic_name);
                self.record_default(EntityKind::Epic, "description", &synthesized);
                synthesized
            }
        };

        let mut tasks = Vec::new();
        if let Some(Value::Array(items)) = lookup(obj, EPIC_ALIASES, "tasks") {
            for (i, item) in items.iter().enumerate() {
                match self.reconcile_task(item, i + 1) {
                    Ok(task) => tasks.push(task),
                    Err(rejection) => self.record_rejection(rejection),
                }
            }
        }

        Ok(Epic {
            epic_name,
            description,
            tasks,
        })
    }

    /// Reconcile one task. `position` is its 1-based place in the source
    /// list, used when the model gave no sequence. A bare string is taken
    /// as the task name.
    pub fn reconcile_task(&mut self, value: &Value, position: usize) -> Result<Task, ValidationRejection> {
        let empty = Map::new();
        let (obj, bare_name) = match value {
            Value::Object(obj) => (obj, None),
            Value::String(s) => (&empty, Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            _ => {
                return Err(ValidationRejection::new(
                    EntityKind::Task,
                    "not an object or string",
                ))
            }
        };

        let task_name = bare_name
            .or_else(|| lookup(obj, TASK_ALIASES, "task_name").and_then(as_text))
            .ok_or_else(|| ValidationRejection::new(EntityKind::Task, "missing task_name"))?;

        let timeline = match lookup(obj, TASK_ALIASES, "timeline_days") {
            Some(raw) => as_integer(raw).unwrap_or_else(|| {
                self.record_default(EntityKind::Task, "timeline_days", 0);
                0
            }),
            None => {
                let estimate = self.estimator.estimate_days();
                self.record_default(EntityKind::Task, "timeline_days", estimate);
                i64::from(estimate)
            }
        };
        if timeline <= 0 || timeline >= i64::from(self.limits.task_ceiling) {
            return Err(ValidationRejection::new(
                EntityKind::Task,
                format!("'{}' has unrealistic timeline_days {}", task_name, timeline),
            ));
        }

        let status = match lookup(obj, TASK_ALIASES, "status") {
            Some(raw) => match as_text(raw).as_deref().and_then(TaskStatus::parse) {
                Some(status) => status,
                None => {
                    self.record_default(EntityKind::Task, "status", TaskStatus::Backlog);
                    TaskStatus::Backlog
                }
            },
            None => {
                self.record_default(EntityKind::Task, "status", TaskStatus::Backlog);
                TaskStatus::Backlog
            }
        };

        let sequence = match lookup(obj, TASK_ALIASES, "sequence")
            .and_then(as_integer)
            .filter(|n| *n >= 1 && *n <= i64::from(u32::MAX))
        {
            Some(n) => n as u32,
            None => {
                self.record_default(EntityKind::Task, "sequence", position);
                position as u32
            }
        };

        let assigned_to = lookup(obj, TASK_ALIASES, "assigned_to").and_then(as_text);

        Ok(Task {
            task_name,
            timeline_days: timeline as u32,
            status,
            sequence,
            assigned_to,
        })
    }

    /// Reconcile a list of milestone objects, dropping rejected ones
    pub fn reconcile_milestones(&mut self, values: &[Value]) -> Vec<Milestone> {
        let mut milestones = Vec::with_capacity(values.len());
        for value in values {
            match self.reconcile_milestone(value) {
                Ok(milestone) => milestones.push(milestone),
                Err(rejection) => self.record_rejection(rejection),
            }
        }
        milestones
    }

    /// Reconcile one milestone. Negative timelines clamp to zero; a zero or
    /// implausibly large timeline rejects the milestone.
    pub fn reconcile_milestone(&mut self, value: &Value) -> Result<Milestone, ValidationRejection> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationRejection::new(EntityKind::Milestone, "not an object"))?;

        let name = lookup(obj, MILESTONE_ALIASES, "name")
            .and_then(as_text)
            .ok_or_else(|| ValidationRejection::new(EntityKind::Milestone, "missing name"))?;

        let description = match lookup(obj, MILESTONE_ALIASES, "description").and_then(as_text) {
            Some(description) => description,
            None => {
                let synthesized = format!("Milestone for {}", name);
                self.record_default(EntityKind::Milestone, "description", &synthesized);
                synthesized
            }
        };

        let timeline = match lookup(obj, MILESTONE_ALIASES, "timeline_days").and_then(as_integer) {
            Some(days) => days.max(0),
            None => {
                self.record_default(EntityKind::Milestone, "timeline_days", 0);
                0
            }
        };
        if timeline == 0 {
            return Err(ValidationRejection::new(
                EntityKind::Milestone,
                format!("'{}' has no usable timeline_days", name),
            ));
        }
        if timeline >= i64::from(self.limits.milestone_ceiling) {
            return Err(ValidationRejection::new(
                EntityKind::Milestone,
                format!("'{}' has unrealistic timeline_days {}", name, timeline),
            ));
        }

        Ok(Milestone {
            name,
            description,
            timeline_days: timeline as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::FixedEstimator;
    use serde_json::json;

    fn reconciler(est: &mut FixedEstimator) -> Reconciler<'_> {
        Reconciler::new(est, TimelineLimits::default())
    }

    #[test]
    fn test_task_aliases() {
        let mut est = FixedEstimator(4);
        let mut r = reconciler(&mut est);
        let task = r
            .reconcile_task(&json!({"taskName": "Do X", "days": 3}), 1)
            .unwrap();
        assert_eq!(
            task,
            Task {
                task_name: "Do X".to_string(),
                timeline_days: 3,
                status: TaskStatus::Backlog,
                sequence: 1,
                assigned_to: None,
            }
        );
    }

    #[test]
    fn test_priority_order_and_numbered_suffix() {
        let obj = json!({"name": "fallback", "task_name": "primary"});
        let map = obj.as_object().unwrap();
        assert_eq!(lookup(map, TASK_ALIASES, "task_name"), Some(&json!("primary")));

        let obj = json!({"task_name0": "numbered", "title": ""});
        let map = obj.as_object().unwrap();
        assert_eq!(lookup(map, TASK_ALIASES, "task_name"), Some(&json!("numbered")));

        let obj = json!({"name0": "M1"});
        let map = obj.as_object().unwrap();
        assert_eq!(lookup(map, MILESTONE_ALIASES, "name"), Some(&json!("M1")));
        assert_eq!(lookup(map, MILESTONE_ALIASES, "nonexistent"), None);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let obj = json!({"TASK_NAME": "shouting"});
        let map = obj.as_object().unwrap();
        assert_eq!(lookup(map, TASK_ALIASES, "task_name"), None);
    }

    #[test]
    fn test_null_and_blank_values_fall_through() {
        let obj = json!({"epic_name": null, "Epic Name": "  ", "name": "Reporting"});
        let map = obj.as_object().unwrap();
        assert_eq!(lookup(map, EPIC_ALIASES, "epic_name"), Some(&json!("Reporting")));
    }

    #[test]
    fn test_missing_timeline_uses_estimator_and_records_default() {
        let mut est = FixedEstimator(2);
        let mut r = reconciler(&mut est);
        let task = r.reconcile_task(&json!({"task_name": "Write docs"}), 4).unwrap();
        assert_eq!(task.timeline_days, 2);
        assert_eq!(task.sequence, 4);
        let fields: Vec<&str> = r.report().defaults.iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["timeline_days", "status", "sequence"]);
    }

    #[test]
    fn test_non_numeric_timeline_rejects_task() {
        let mut est = FixedEstimator(2);
        let mut r = reconciler(&mut est);
        let err = r
            .reconcile_task(&json!({"task_name": "Spike", "timeline_days": "soon"}), 1)
            .unwrap_err();
        assert_eq!(err.entity, EntityKind::Task);
        assert!(r
            .reconcile_task(&json!({"task_name": "Spike", "timeline_days": -2}), 1)
            .is_err());
        assert!(r
            .reconcile_task(&json!({"task_name": "Spike", "timeline_days": 5000}), 1)
            .is_err());
    }

    #[test]
    fn test_timeline_coercions() {
        assert_eq!(as_integer(&json!("3 days")), Some(3));
        assert_eq!(as_integer(&json!(2.5)), Some(3));
        assert_eq!(as_integer(&json!("4")), Some(4));
        assert_eq!(as_integer(&json!("-1")), Some(-1));
        assert_eq!(as_integer(&json!("a week")), None);
        assert_eq!(as_integer(&json!(true)), None);
    }

    #[test]
    fn test_status_and_sequence_from_model() {
        let mut est = FixedEstimator(1);
        let mut r = reconciler(&mut est);
        let task = r
            .reconcile_task(
                &json!({"Task Name": "Ship", "Timeline": "2", "Status": "In Progress", "order": 7, "assignee": "Rahul"}),
                1,
            )
            .unwrap();
        assert_eq!(task.status, TaskStatus::Progress);
        assert_eq!(task.sequence, 7);
        assert_eq!(task.assigned_to.as_deref(), Some("Rahul"));
        assert!(r.report().defaults.is_empty());
    }

    #[test]
    fn test_bare_string_task() {
        let mut est = FixedEstimator(3);
        let mut r = reconciler(&mut est);
        let task = r.reconcile_task(&json!("Set up CI"), 2).unwrap();
        assert_eq!(task.task_name, "Set up CI");
        assert_eq!(task.timeline_days, 3);
        assert_eq!(task.sequence, 2);
    }

    #[test]
    fn test_epic_defaults_and_task_filtering() {
        let mut est = FixedEstimator(1);
        let mut r = reconciler(&mut est);
        let epic = r
            .reconcile_epic(&json!({
                "Epic Name": "Auth",
                "tasks": [
                    {"task_name": "Login", "timeline_days": 2},
                    {"timeline_days": 2},
                    {"task_name": "Register", "timeline_days": 0}
                ]
            }))
            .unwrap();
        assert_eq!(epic.epic_name, "Auth");
        assert_eq!(epic.description, "Implementation of Auth module.");
        assert_eq!(epic.tasks.len(), 1);
        assert_eq!(r.report().rejections.len(), 2);
    }

    #[test]
    fn test_epic_without_name_is_rejected() {
        let mut est = FixedEstimator(1);
        let mut r = reconciler(&mut est);
        let epics = r.reconcile_epics(&[json!({"description": "x"}), json!({"epic": "Reports"})]);
        assert_eq!(epics.len(), 1);
        assert_eq!(epics[0].epic_name, "Reports");
        assert_eq!(r.into_report().rejections.len(), 1);
    }

    #[test]
    fn test_milestone_timeline_sanity() {
        let mut est = FixedEstimator(1);
        let mut r = reconciler(&mut est);
        assert!(r
            .reconcile_milestone(&json!({"name": "Kickoff", "timeline_days": 0}))
            .is_err());
        assert!(r
            .reconcile_milestone(&json!({"name": "Far", "timeline_days": 5000}))
            .is_err());
        assert!(r
            .reconcile_milestone(&json!({"name": "Neg", "timeline_days": -10}))
            .is_err());
        let ok = r
            .reconcile_milestone(&json!({"Name": "Beta", "Timeline": 30}))
            .unwrap();
        assert_eq!(ok.timeline_days, 30);
        assert_eq!(ok.description, "Milestone for Beta");
    }
}
