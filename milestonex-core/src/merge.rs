//! Epic deduplication across batches

use std::collections::HashMap;

use crate::models::{Epic, TaskStatus};

/// Merge epics that share a normalized name.
///
/// The first occurrence fixes the display name and description. Tasks are
/// concatenated in arrival order, renumbered 1..N and reset to Backlog.
/// Epics come out in first-seen order.
pub fn merge<I>(epics: I) -> Vec<Epic>
where
    I: IntoIterator<Item = Epic>,
{
    let mut merged: Vec<Epic> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for epic in epics {
        let key = epic.normalized_name();
        match index.get(&key) {
            Some(&slot) => {
                log::debug!(
                    "Merging duplicate epic '{}' into '{}'",
                    epic.epic_name,
                    merged[slot].epic_name
                );
                merged[slot].tasks.extend(epic.tasks);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(Epic {
                    epic_name: epic.epic_name.trim().to_string(),
                    ..epic
                });
            }
        }
    }

    for epic in &mut merged {
        epic.renumber();
        for task in &mut epic.tasks {
            task.status = TaskStatus::Backlog;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn epic(name: &str, desc: &str, tasks: &[&str]) -> Epic {
        let mut e = Epic::new(name, desc);
        for (i, t) in tasks.iter().enumerate() {
            e.tasks.push(Task::new(*t, 2, i as u32 + 1));
        }
        e
    }

    #[test]
    fn test_merge_groups_by_normalized_name() {
        let merged = merge(vec![
            epic("User Management", "first", &["login", "register"]),
            epic("Reports", "r", &["export"]),
            epic("  user management ", "second", &["profile"]),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].epic_name, "User Management");
        assert_eq!(merged[0].description, "first");
        let names: Vec<&str> = merged[0].tasks.iter().map(|t| t.task_name.as_str()).collect();
        assert_eq!(names, vec!["login", "register", "profile"]);
        let seqs: Vec<u32> = merged[0].tasks.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(merged[1].epic_name, "Reports");
    }

    #[test]
    fn test_merge_with_itself_doubles_tasks() {
        let epics = vec![epic("A", "", &["a1", "a2"]), epic("B", "", &["b1"])];
        let doubled: Vec<Epic> = epics.iter().chain(epics.iter()).cloned().collect();
        let merged = merge(doubled);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].tasks.len(), 4);
        assert_eq!(merged[1].tasks.len(), 2);
        let seqs: Vec<u32> = merged[0].tasks.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_merge_resets_status() {
        let mut e = epic("A", "", &["a1"]);
        e.tasks[0].status = TaskStatus::Done;
        e.tasks[0].sequence = 9;
        let merged = merge(vec![e]);
        assert_eq!(merged[0].tasks[0].status, TaskStatus::Backlog);
        assert_eq!(merged[0].tasks[0].sequence, 1);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(Vec::new()).is_empty());
    }
}
