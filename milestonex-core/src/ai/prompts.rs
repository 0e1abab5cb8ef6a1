//! Prompt Templates for AI Operations
//!
//! Each template asks for JSON only, using the canonical field names the
//! reconciler looks for first.

use crate::models::{TaskView, TeamMember};

/// Build the prompt that turns one SRS chunk into epics with tasks
pub fn build_epics_prompt(srs_chunk: &str) -> String {
    format!(
        r#"You are a professional software project manager.

Convert the following SRS excerpt into a JSON array of epics with tasks.

Rules:
1. Each epic must have fields: "epic_name", "description", "tasks"
2. Each task must have fields: "task_name", "timeline_days", "status", "sequence"
3. Group related SRS lines into separate epics based on module/feature
4. Ignore numbers, bullets, empty lines
5. Tasks initially go into "Backlog", sequence in order starting at 1
6. timeline_days must be an integer; keep it realistic (1-5 days)
7. Output clean, parseable JSON ONLY. No markdown, no explanation.

SRS:
{}
"#,
        srs_chunk.trim()
    )
}

/// Build the prompt that extracts milestones from the whole SRS
pub fn build_milestones_prompt(srs_text: &str) -> String {
    format!(
        r#"You are a professional software project manager.

From the following SRS document, create a list of realistic project milestones.
Each milestone should represent a major checkpoint in the project.

Rules:
1. Output only a JSON array.
2. Each milestone must have:
   - "name": short title
   - "description": one line explaining the milestone
   - "timeline_days": integer days from project start
3. Keep milestones feasible and sequential.
4. No extra explanations.

SRS:
{}
"#,
        srs_text.trim()
    )
}

/// Build the prompt that assigns tasks to team members
pub fn build_allocation_prompt(tasks: &[TaskView], team: &[TeamMember]) -> String {
    let team_json = serde_json::to_string_pretty(team).unwrap_or_else(|_| "[]".to_string());
    let tasks_json = serde_json::to_string_pretty(tasks).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are a smart project manager assistant.

Team Members:
{}

Tasks to assign:
{}

Rules:
1. Assign each task to the team member whose skills best match the task.
2. Consider availability_days so no one is overbooked.
3. Use task names and member names exactly as given.
4. Return ONLY a JSON array of objects with fields:
   - "task_name"
   - "assigned_to"
   - "timeline_days"
   - "epic_name"
"#,
        team_json, tasks_json
    )
}
