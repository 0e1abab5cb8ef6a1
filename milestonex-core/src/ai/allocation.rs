//! Allocation Reconciliation
//!
//! Validates task-to-person assignments proposed by the model against the
//! tasks and team that were actually supplied. Nothing is fabricated: an
//! entry naming an unknown task or person is dropped, and tasks the model
//! skipped stay unassigned.

use serde_json::Value;
use std::collections::HashMap;

use super::reconcile::{
    as_text, lookup, EntityKind, ReconcileReport, ValidationRejection, ALLOCATION_ALIASES,
};
use super::responses::{parse_with, ALLOCATION_SHAPE};
use crate::models::{normalize_name, Allocation, TaskView, TeamMember};

/// Parse raw model output and reconcile it into allocations.
///
/// A parse failure yields no allocations.
pub fn reconcile_allocation(tasks: &[TaskView], team: &[TeamMember], raw: &str) -> Vec<Allocation> {
    match parse_with(raw, &ALLOCATION_SHAPE) {
        Ok(values) => {
            let mut report = ReconcileReport::default();
            reconcile_allocation_values(tasks, team, &values, &mut report)
        }
        Err(failure) => {
            log::warn!("Allocation output could not be parsed: {}", failure);
            Vec::new()
        }
    }
}

/// Reconcile already-parsed allocation entries.
///
/// At most one allocation is kept per task (the last valid one the model
/// gave). Entries are then checked in task order against each member's
/// `availability_days`; an entry that would overbook its member is dropped.
pub fn reconcile_allocation_values(
    tasks: &[TaskView],
    team: &[TeamMember],
    values: &[Value],
    report: &mut ReconcileReport,
) -> Vec<Allocation> {
    let mut chosen: Vec<Option<usize>> = vec![None; tasks.len()];

    for value in values {
        match resolve_entry(tasks, team, value, &chosen) {
            Ok((task_idx, member_idx)) => {
                if let Some(previous) = chosen[task_idx] {
                    if previous != member_idx {
                        log::debug!(
                            "Task '{}' reassigned from {} to {}",
                            tasks[task_idx].task_name,
                            team[previous].name,
                            team[member_idx].name
                        );
                    }
                }
                chosen[task_idx] = Some(member_idx);
            }
            Err(rejection) => {
                log::warn!("Dropping allocation: {}", rejection);
                report.rejections.push(rejection);
            }
        }
    }

    let mut booked: HashMap<usize, u64> = HashMap::new();
    let mut allocations = Vec::new();
    for (task_idx, member_idx) in chosen.into_iter().enumerate() {
        let Some(member_idx) = member_idx else {
            continue;
        };
        let task = &tasks[task_idx];
        let member = &team[member_idx];
        let used = booked.entry(member_idx).or_insert(0);
        if *used + u64::from(task.timeline_days) > u64::from(member.availability_days) {
            let rejection = ValidationRejection::new(
                EntityKind::Allocation,
                format!(
                    "'{}' would overbook {} ({} + {} > {} days)",
                    task.task_name, member.name, used, task.timeline_days, member.availability_days
                ),
            );
            log::warn!("Dropping allocation: {}", rejection);
            report.rejections.push(rejection);
            continue;
        }
        *used += u64::from(task.timeline_days);
        allocations.push(Allocation {
            task_name: task.task_name.clone(),
            assigned_to: member.name.clone(),
            epic_name: Some(task.epic_name.clone()),
            timeline_days: task.timeline_days,
        });
    }

    let unassigned = tasks.len() - allocations.len();
    if unassigned > 0 {
        log::info!("{} of {} tasks left unassigned", unassigned, tasks.len());
    }
    allocations
}

fn resolve_entry(
    tasks: &[TaskView],
    team: &[TeamMember],
    value: &Value,
    chosen: &[Option<usize>],
) -> Result<(usize, usize), ValidationRejection> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationRejection::new(EntityKind::Allocation, "not an object"))?;

    let task_name = lookup(obj, ALLOCATION_ALIASES, "task_name")
        .and_then(as_text)
        .ok_or_else(|| ValidationRejection::new(EntityKind::Allocation, "missing task_name"))?;
    let person = lookup(obj, ALLOCATION_ALIASES, "assigned_to")
        .and_then(as_text)
        .ok_or_else(|| {
            ValidationRejection::new(
                EntityKind::Allocation,
                format!("'{}' has no assigned_to", task_name),
            )
        })?;
    let epic_hint = lookup(obj, ALLOCATION_ALIASES, "epic_name").and_then(as_text);

    let task_idx = find_task(tasks, &task_name, epic_hint.as_deref(), chosen).ok_or_else(|| {
        ValidationRejection::new(
            EntityKind::Allocation,
            format!("unknown task '{}'", task_name),
        )
    })?;
    let member_idx = find_member(team, &person).ok_or_else(|| {
        ValidationRejection::new(
            EntityKind::Allocation,
            format!("unknown team member '{}'", person),
        )
    })?;

    Ok((task_idx, member_idx))
}

/// Exact name match first, then a trimmed case-insensitive one. When task
/// names repeat, the epic hint narrows the candidates and a task nobody has
/// claimed yet is preferred over one already allocated.
fn find_task(
    tasks: &[TaskView],
    name: &str,
    epic_hint: Option<&str>,
    chosen: &[Option<usize>],
) -> Option<usize> {
    let exact: Vec<usize> = (0..tasks.len())
        .filter(|&i| tasks[i].task_name == name)
        .collect();
    let mut candidates = if exact.is_empty() {
        let wanted = normalize_name(name);
        (0..tasks.len())
            .filter(|&i| normalize_name(&tasks[i].task_name) == wanted)
            .collect()
    } else {
        exact
    };

    if let Some(epic) = epic_hint.map(normalize_name) {
        let in_epic: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| normalize_name(&tasks[i].epic_name) == epic)
            .collect();
        if !in_epic.is_empty() {
            candidates = in_epic;
        }
    }
    candidates
        .iter()
        .copied()
        .find(|&i| chosen[i].is_none())
        .or_else(|| candidates.first().copied())
}

fn find_member(team: &[TeamMember], name: &str) -> Option<usize> {
    team.iter().position(|m| m.name == name).or_else(|| {
        let wanted = normalize_name(name);
        team.iter().position(|m| normalize_name(&m.name) == wanted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Vec<TeamMember> {
        vec![
            TeamMember::new("Prerna", 10).with_skills(["FastAPI", "Database", "Auth"]),
            TeamMember::new("Rahul", 8).with_skills(["React", "UI"]),
        ]
    }

    fn tasks() -> Vec<TaskView> {
        vec![
            TaskView {
                task_name: "Build login API".to_string(),
                timeline_days: 2,
                epic_name: "User Management".to_string(),
            },
            TaskView {
                task_name: "Design dashboard".to_string(),
                timeline_days: 5,
                epic_name: "Admin Dashboard".to_string(),
            },
            TaskView {
                task_name: "Deploy to cloud".to_string(),
                timeline_days: 4,
                epic_name: "Deployment".to_string(),
            },
        ]
    }

    #[test]
    fn test_unknown_references_are_dropped() {
        let raw = r#"[
            {"task_name": "Build login API", "assigned_to": "Prerna"},
            {"task_name": "Write poetry", "assigned_to": "Rahul"},
            {"task_name": "Design dashboard", "assigned_to": "Zed"}
        ]"#;
        let allocations = reconcile_allocation(&tasks(), &team(), raw);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].task_name, "Build login API");
        assert_eq!(allocations[0].assigned_to, "Prerna");
        assert_eq!(allocations[0].epic_name.as_deref(), Some("User Management"));
    }

    #[test]
    fn test_wrapped_output_and_aliases() {
        let raw = r#"{"allocations": [
            {"taskName": "build login api", "assignee": "rahul"},
            {"task": "Deploy to cloud", "member": "Prerna", "days": 99}
        ]}"#;
        let allocations = reconcile_allocation(&tasks(), &team(), raw);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].task_name, "Build login API");
        assert_eq!(allocations[0].assigned_to, "Rahul");
        // timeline comes from the task, not the model
        assert_eq!(allocations[1].timeline_days, 4);
    }

    #[test]
    fn test_last_allocation_wins() {
        let raw = r#"[
            {"task_name": "Build login API", "assigned_to": "Prerna"},
            {"task_name": "Build login API", "assigned_to": "Rahul"}
        ]"#;
        let allocations = reconcile_allocation(&tasks(), &team(), raw);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].assigned_to, "Rahul");
    }

    #[test]
    fn test_overbooking_is_rejected() {
        let team = vec![TeamMember::new("Solo", 6)];
        let values: Vec<Value> = tasks()
            .iter()
            .map(|t| serde_json::json!({"task_name": t.task_name, "assigned_to": "Solo"}))
            .collect();
        let mut report = ReconcileReport::default();
        let allocations = reconcile_allocation_values(&tasks(), &team, &values, &mut report);
        let names: Vec<&str> = allocations.iter().map(|a| a.task_name.as_str()).collect();
        // 2 days fits, 2+5 does not, 2+4 fits
        assert_eq!(names, vec!["Build login API", "Deploy to cloud"]);
        assert_eq!(report.rejections.len(), 1);
    }

    #[test]
    fn test_garbage_output_yields_nothing() {
        assert!(reconcile_allocation(&tasks(), &team(), "I cannot help").is_empty());
    }

    #[test]
    fn test_huge_timelines_do_not_overflow_availability() {
        let tasks = vec![
            TaskView {
                task_name: "a".to_string(),
                timeline_days: 4_000_000_000,
                epic_name: "E".to_string(),
            },
            TaskView {
                task_name: "b".to_string(),
                timeline_days: 4_000_000_000,
                epic_name: "E".to_string(),
            },
        ];
        let team = vec![TeamMember::new("P", u32::MAX)];
        let values = vec![
            serde_json::json!({"task_name": "a", "assigned_to": "P"}),
            serde_json::json!({"task_name": "b", "assigned_to": "P"}),
        ];
        let mut report = ReconcileReport::default();
        let allocations = reconcile_allocation_values(&tasks, &team, &values, &mut report);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].task_name, "a");
        assert_eq!(report.rejections.len(), 1);
    }

    #[test]
    fn test_repeated_task_names_each_get_assigned() {
        let tasks = vec![
            TaskView {
                task_name: "Write tests".to_string(),
                timeline_days: 1,
                epic_name: "QA".to_string(),
            },
            TaskView {
                task_name: "Write tests".to_string(),
                timeline_days: 1,
                epic_name: "QA".to_string(),
            },
        ];
        let raw = r#"[
            {"task_name": "Write tests", "assigned_to": "Prerna"},
            {"task_name": "Write tests", "assigned_to": "Rahul"}
        ]"#;
        let allocations = reconcile_allocation(&tasks, &team(), raw);
        let people: Vec<&str> = allocations.iter().map(|a| a.assigned_to.as_str()).collect();
        assert_eq!(people, vec!["Prerna", "Rahul"]);
    }
}
