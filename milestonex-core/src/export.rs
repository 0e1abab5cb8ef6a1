use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::models::{Epic, Milestone, TaskStatus};
use crate::project::Project;

/// Output formats for a project export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            _ => anyhow::bail!("Unknown export format: {}. Supported formats: markdown, json", s),
        }
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

/// JSON export document: epics and milestones under their project
#[derive(Debug, Serialize)]
pub struct ProjectExport<'a> {
    pub project_id: String,
    pub project_name: &'a str,
    pub created_at: String,
    pub epics: &'a [Epic],
    pub milestones: &'a [Milestone],
}

/// Render a project as JSON with canonical field names
pub fn render_json(project: &Project, epics: &[Epic], milestones: &[Milestone]) -> Result<String> {
    let doc = ProjectExport {
        project_id: project.id.to_string(),
        project_name: &project.name,
        created_at: project.created_at.to_rfc3339(),
        epics,
        milestones,
    };
    serde_json::to_string_pretty(&doc).context("Failed to serialize project")
}

/// Render a project as a Kanban board: one section per status column,
/// tasks grouped by epic in sequence order, then a milestone table
pub fn render_kanban_markdown(project: &Project, epics: &[Epic], milestones: &[Milestone]) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {} - Board\n\n", project.name));
    output.push_str(&format!(
        "Project `{}` created {}\n\n",
        project.id,
        project.created_at.format("%Y-%m-%d")
    ));

    for status in TaskStatus::ALL {
        let count: usize = epics
            .iter()
            .map(|e| e.tasks.iter().filter(|t| t.status == status).count())
            .sum();
        output.push_str(&format!("## {} ({})\n\n", status, count));
        if count == 0 {
            output.push_str("_No tasks_\n\n");
            continue;
        }

        for epic in epics {
            let mut tasks: Vec<_> = epic.tasks.iter().filter(|t| t.status == status).collect();
            if tasks.is_empty() {
                continue;
            }
            tasks.sort_by_key(|t| t.sequence);

            output.push_str(&format!("### {}\n\n", epic.epic_name));
            for task in tasks {
                let assignee = task
                    .assigned_to
                    .as_deref()
                    .map(|p| format!(" @{}", p))
                    .unwrap_or_default();
                output.push_str(&format!(
                    "- [{}] {} ({}d){}\n",
                    if status == TaskStatus::Done { "x" } else { " " },
                    task.task_name,
                    task.timeline_days,
                    assignee
                ));
            }
            output.push('\n');
        }
    }

    if !milestones.is_empty() {
        output.push_str("## Milestones\n\n");
        output.push_str("| Day | Milestone | Description |\n");
        output.push_str("|----:|-----------|-------------|\n");
        for m in milestones {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                m.timeline_days,
                m.name.replace('|', "\\|"),
                m.description.replace('|', "\\|")
            ));
        }
        output.push('\n');
    }

    output
}

/// Render and write a project export
pub fn export_project(
    project: &Project,
    epics: &[Epic],
    milestones: &[Milestone],
    format: ExportFormat,
    output_path: &Path,
) -> Result<()> {
    let content = match format {
        ExportFormat::Markdown => render_kanban_markdown(project, epics, milestones),
        ExportFormat::Json => render_json(project, epics, milestones)?,
    };
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write export to {}", output_path.display()))?;
    log::info!("Exported project {} to {}", project.id, output_path.display());
    Ok(())
}
