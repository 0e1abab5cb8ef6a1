use anyhow::Result;
use inquire::{Confirm, CustomType, Select, Text};
use uuid::Uuid;

use milestonex_core::{NewTask, TaskStatus};

const NEW_EPIC: &str = "Create new epic";

/// Prompts the user for a new task in one of the project's epics
pub fn prompt_new_task(project_id: Uuid, epic_names: &[String]) -> Result<NewTask> {
    let mut epic_options = vec![NEW_EPIC.to_string()];
    epic_options.extend(epic_names.iter().cloned());

    let epic_selection = Select::new("Epic:", epic_options).prompt()?;
    let epic_name = if epic_selection == NEW_EPIC {
        Text::new("New epic name:").prompt()?
    } else {
        epic_selection
    };

    let task_name = Text::new("Task name:").prompt()?;

    let timeline_days = CustomType::<u32>::new("Timeline (days):")
        .with_default(1)
        .with_error_message("Please enter a whole number of days")
        .prompt()?;

    let status = Select::new("Status:", TaskStatus::ALL.to_vec()).prompt()?;

    let assigned_to = if Confirm::new("Assign now?").with_default(false).prompt()? {
        Some(Text::new("Assignee:").prompt()?)
    } else {
        None
    };

    Ok(NewTask {
        project_id,
        epic_name,
        task_name,
        timeline_days,
        status,
        assigned_to,
    })
}

/// Asks for confirmation, defaulting to no
pub fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}
