mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use milestonex_core::db::{self, BackendType, DatabaseBackend, DatabaseConfig};
use milestonex_core::{
    determine_db_path, export_project, get_config_path, AiClient, ExportFormat, GenerationReport,
    ModelAdapter, NewTask, Planner, PlannerConfig, StubModel, TaskRecord, TaskStatus, TaskUpdate,
    TaskView, TeamMember,
};

use crate::cli::{
    Cli, Command, ConfigCommand, DbCommand, GenerateCommand, ProjectCommand, TaskCommand,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let db_path = determine_db_path(cli.db.clone());

    match &cli.command {
        Command::Analyze { file, name } => {
            let planner = build_planner(&cli)?;
            let backend = open_db(&db_path)?;
            analyze(&planner, backend.as_ref(), file, name.as_deref())?;
        }
        Command::Generate(cmd) => {
            let planner = build_planner(&cli)?;
            handle_generate_command(&planner, cmd)?;
        }
        Command::Project(cmd) => {
            let backend = open_db(&db_path)?;
            handle_project_command(backend.as_ref(), cmd)?;
        }
        Command::Task(cmd) => {
            let backend = open_db(&db_path)?;
            handle_task_command(backend.as_ref(), cmd)?;
        }
        Command::Allocate {
            project,
            team,
            dry_run,
        } => {
            let planner = build_planner(&cli)?;
            let backend = open_db(&db_path)?;
            allocate(&planner, backend.as_ref(), project, team, *dry_run)?;
        }
        Command::Export {
            project,
            format,
            output,
        } => {
            let backend = open_db(&db_path)?;
            handle_export_command(backend.as_ref(), project, format, output.as_deref())?;
        }
        Command::Db(cmd) => {
            handle_db_command(cmd, &db_path)?;
        }
        Command::Config(cmd) => {
            handle_config_command(cmd, cli.config.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn open_db(path: &Path) -> Result<Box<dyn DatabaseBackend>> {
    db::open(&DatabaseConfig::for_path(path))
        .with_context(|| format!("Failed to open database {}", path.display()))
}

fn build_planner(cli: &Cli) -> Result<Planner> {
    let config = PlannerConfig::resolve(cli.config.as_deref())?;
    let model: Box<dyn ModelAdapter> = if cli.stub {
        Box::new(StubModel::new())
    } else {
        Box::new(AiClient::from_config(&config.model))
    };
    log::info!("Using model: {}", model.describe());
    Ok(Planner::new(model, config))
}

fn read_srs(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read SRS file {}", file.display()))
}

fn analyze(planner: &Planner, backend: &dyn DatabaseBackend, file: &Path, name: Option<&str>) -> Result<()> {
    let text = read_srs(file)?;
    let (analysis, report) = planner
        .analyze_with_report(&text)
        .with_context(|| format!("Cannot analyze {}", file.display()))?;

    let name = name
        .map(str::to_string)
        .or_else(|| file.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "Untitled".to_string());
    let project = backend.add_analysis(&name, &text, &analysis)?;

    println!("{} Project '{}' created", "✓".green(), project.name);
    println!("ID: {}", project.id.to_string().green());
    println!(
        "{} epics, {} tasks, {} milestones",
        analysis.epics.len(),
        analysis.task_count(),
        analysis.milestones.len()
    );
    print_report(&report);

    for epic in &analysis.epics {
        println!();
        println!("{} ({} days)", epic.epic_name.bold(), epic.total_days());
        for task in &epic.tasks {
            println!("  {:>2}. {} ({}d)", task.sequence, task.task_name, task.timeline_days);
        }
    }

    Ok(())
}

fn print_report(report: &GenerationReport) {
    let line = format!(
        "{} units: {} from model, {} from fallback; {} defaults applied, {} items rejected",
        report.units,
        report.model_units,
        report.fallback_units,
        report.defaults_applied(),
        report.items_rejected()
    );
    if report.fallback_units > 0 || report.items_rejected() > 0 {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.dimmed());
    }
}

fn handle_generate_command(planner: &Planner, cmd: &GenerateCommand) -> Result<()> {
    let json = match cmd {
        GenerateCommand::Epics { file } => {
            let text = read_srs(file)?;
            let epics = planner
                .generate_epics(&text)
                .with_context(|| format!("Cannot generate epics from {}", file.display()))?;
            serde_json::to_string_pretty(&epics)?
        }
        GenerateCommand::Milestones { file } => {
            let text = read_srs(file)?;
            let milestones = planner
                .generate_milestones(&text)
                .with_context(|| format!("Cannot generate milestones from {}", file.display()))?;
            serde_json::to_string_pretty(&milestones)?
        }
    };
    println!("{}", json);
    Ok(())
}

fn handle_project_command(backend: &dyn DatabaseBackend, cmd: &ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::List => {
            let projects = backend.list_projects()?;
            if projects.is_empty() {
                println!("{}", "No projects found.".yellow());
                return Ok(());
            }

            println!("{:<36} | {:<30} | {:<10} | {:<5}", "ID", "Name", "Created", "Tasks");
            println!("{}", "-".repeat(90));
            for project in projects {
                let tasks = backend.list_tasks(Some(&project.id))?.len();
                println!(
                    "{:<36} | {:<30} | {:<10} | {:<5}",
                    project.id,
                    project.name,
                    project.created_at.format("%Y-%m-%d"),
                    tasks
                );
            }
        }
        ProjectCommand::Show { id } => {
            let project = backend.find_project(id)?;
            let epics = backend.get_epics(&project.id)?;
            let milestones = backend.list_milestones(&project.id)?;

            println!("{}", project.name.bold());
            println!("ID: {}", project.id);
            println!("Created: {}", project.created_at.format("%Y-%m-%d %H:%M"));

            for epic in &epics {
                println!();
                println!("{} ({} days)", epic.epic_name.bold(), epic.total_days());
                if !epic.description.is_empty() {
                    println!("  {}", epic.description.dimmed());
                }
                for task in &epic.tasks {
                    println!(
                        "  {:>2}. {:<40} {:>3}d  {:<10} {}",
                        task.sequence,
                        task.task_name,
                        task.timeline_days,
                        status_label(task.status),
                        task.assigned_to.as_deref().unwrap_or("-")
                    );
                }
            }

            if !milestones.is_empty() {
                println!();
                println!("{}", "Milestones".bold());
                for m in &milestones {
                    println!("  day {:>4}  {} - {}", m.timeline_days, m.name, m.description);
                }
            }
        }
    }
    Ok(())
}

fn status_label(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Backlog => "Backlog".yellow(),
        TaskStatus::Progress => "Progress".blue(),
        TaskStatus::Done => "Done".green(),
    }
}

fn parse_status(status_str: &str) -> Result<TaskStatus> {
    TaskStatus::parse(status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid status: {} (expected backlog, progress or done)", status_str))
}

fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn handle_task_command(backend: &dyn DatabaseBackend, cmd: &TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::List { project } => {
            let project_id = match project {
                Some(key) => Some(backend.find_project(key)?.id),
                None => None,
            };
            list_tasks(backend, project_id.as_ref())?;
        }
        TaskCommand::Show { id } => {
            let task = backend.find_task(id)?;
            print_task(&task);
        }
        TaskCommand::Add {
            project,
            epic,
            name,
            days,
            status,
            assignee,
            interactive,
        } => {
            let project = backend.find_project(project)?;
            let new_task = if *interactive || name.is_none() {
                let epic_names: Vec<String> = backend
                    .get_epics(&project.id)?
                    .into_iter()
                    .map(|e| e.epic_name)
                    .collect();
                prompts::prompt_new_task(project.id, &epic_names)?
            } else {
                NewTask {
                    project_id: project.id,
                    epic_name: epic
                        .clone()
                        .ok_or_else(|| anyhow::anyhow!("Epic is required. Use --epic to specify one."))?,
                    task_name: name.clone().unwrap_or_default(),
                    timeline_days: days.unwrap_or(1),
                    status: status.as_deref().map(parse_status).transpose()?.unwrap_or_default(),
                    assigned_to: assignee.clone(),
                }
            };

            let record = backend.add_task(new_task)?;
            println!("{}", "Task added successfully!".green());
            print_task(&record);
        }
        TaskCommand::Update {
            id,
            name,
            days,
            status,
            assignee,
        } => {
            let task = backend.find_task(id)?;
            let update = TaskUpdate {
                task_name: name.clone(),
                timeline_days: *days,
                status: status.as_deref().map(parse_status).transpose()?,
                assigned_to: assignee.clone(),
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update. Use --name, --days, --status or --assignee.");
            }

            let record = backend.update_task(&task.id, &update)?;
            println!("{}", "Task updated successfully!".green());
            print_task(&record);
        }
        TaskCommand::Del { id, yes } => {
            let task = backend.find_task(id)?;

            println!("{}", "Task to delete:".yellow());
            println!("  ID: {}", task.id);
            println!("  Epic: {}", task.epic_name);
            println!("  Name: {}", task.task_name);

            if !*yes && !prompts::confirm("Are you sure you want to delete this task?")? {
                println!("{}", "Deletion cancelled.".yellow());
                return Ok(());
            }

            backend.delete_task(&task.id)?;
            println!("{}", "Task deleted successfully!".green());
        }
    }
    Ok(())
}

fn list_tasks(backend: &dyn DatabaseBackend, project_id: Option<&Uuid>) -> Result<()> {
    let tasks = backend.list_tasks(project_id)?;
    if tasks.is_empty() {
        println!("{}", "No tasks found.".yellow());
        return Ok(());
    }

    println!(
        "{:<8} | {:<24} | {:>3} | {:<40} | {:>4} | {:<10} | {:<15}",
        "ID", "Epic", "Seq", "Task", "Days", "Status", "Assignee"
    );
    println!("{}", "-".repeat(120));
    for task in tasks {
        println!(
            "{:<8} | {:<24} | {:>3} | {:<40} | {:>4} | {:<10} | {:<15}",
            short_id(&task.id),
            task.epic_name,
            task.sequence,
            task.task_name,
            task.timeline_days,
            status_label(task.status),
            task.assigned_to.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn print_task(task: &TaskRecord) {
    println!("{}", task.task_name.bold());
    println!("ID: {}", task.id);
    println!("Project: {}", task.project_id);
    println!("Epic: {} (#{})", task.epic_name, task.sequence);
    println!("Timeline: {} days", task.timeline_days);
    println!("Status: {}", status_label(task.status));
    println!("Assigned to: {}", task.assigned_to.as_deref().unwrap_or("-"));
}

fn load_team(path: &Path) -> Result<Vec<TeamMember>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read team file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse team file {}", path.display()))
}

fn allocate(
    planner: &Planner,
    backend: &dyn DatabaseBackend,
    project_key: &str,
    team_path: &Path,
    dry_run: bool,
) -> Result<()> {
    let project = backend.find_project(project_key)?;
    let team = load_team(team_path)?;
    let tasks = TaskView::from_epics(&backend.get_epics(&project.id)?);

    let (allocations, report) = planner.allocate_with_report(&tasks, &team);
    print_report(&report);

    if allocations.is_empty() {
        println!("{}", "No allocations produced.".yellow());
        return Ok(());
    }

    println!("{:<40} | {:<24} | {:>4} | {:<15}", "Task", "Epic", "Days", "Assigned to");
    println!("{}", "-".repeat(92));
    for a in &allocations {
        println!(
            "{:<40} | {:<24} | {:>4} | {:<15}",
            a.task_name,
            a.epic_name.as_deref().unwrap_or("-"),
            a.timeline_days,
            a.assigned_to.green()
        );
    }

    if dry_run {
        println!("{}", "Dry run: nothing recorded.".yellow());
        return Ok(());
    }

    let applied = backend.apply_allocations(&project.id, &allocations)?;
    println!("{} {} tasks assigned", "✓".green(), applied);
    Ok(())
}

fn handle_export_command(
    backend: &dyn DatabaseBackend,
    project_key: &str,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;

    let project = backend.find_project(project_key)?;
    let epics = backend.get_epics(&project.id)?;
    let milestones = backend.list_milestones(&project.id)?;

    let output_path = output
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(format!("{}-board.{}", short_id(&project.id), format.extension())));
    export_project(&project, &epics, &milestones, format, &output_path)?;

    println!(
        "{} Exported {} tasks to {}",
        "✓".green(),
        epics.iter().map(|e| e.tasks.len()).sum::<usize>(),
        output_path.display()
    );
    Ok(())
}

fn store_kind(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => "json".to_string(),
        _ => BackendType::from_path(path).to_string(),
    }
}

fn handle_db_command(cmd: &DbCommand, db_path: &Path) -> Result<()> {
    match cmd {
        DbCommand::Migrate { dest } => {
            let count = db::migrate_files(db_path, dest)?;
            println!(
                "{} Copied {} tasks from {} ({}) to {} ({})",
                "✓".green(),
                count,
                db_path.display(),
                store_kind(db_path),
                dest.display(),
                store_kind(dest)
            );
        }
        DbCommand::Path => {
            println!("{}", db_path.display());
        }
        DbCommand::Stats => {
            let backend = open_db(db_path)?;
            let stats = backend.stats()?;
            println!("Backend: {}", stats.backend_type);
            println!("Projects: {}", stats.project_count);
            println!("Tasks: {}", stats.task_count);
            println!("Milestones: {}", stats.milestone_count);
        }
    }
    Ok(())
}

fn handle_config_command(cmd: &ConfigCommand, explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };

    match cmd {
        ConfigCommand::Show => {
            let config = PlannerConfig::resolve(Some(path.as_path()))?;
            let source = if path.exists() { "" } else { " (not found, using defaults)" };
            println!("# {}{}", path.display(), source);
            print!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !*force {
                anyhow::bail!("Config already exists at {}. Use --force to overwrite.", path.display());
            }
            PlannerConfig::default().save(&path)?;
            println!("{} Wrote default config to {}", "✓".green(), path.display());
        }
    }
    Ok(())
}
