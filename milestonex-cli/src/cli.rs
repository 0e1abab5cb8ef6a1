use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Turn SRS documents into epics, tasks, milestones and allocations")]
pub struct Cli {
    /// Path to the plan database (.yaml, or .db/.sqlite for SQLite)
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the planner config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Skip the model and derive everything from the SRS text
    #[clap(long, global = true)]
    pub stub: bool,

    /// Verbose logging
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum GenerateCommand {
    /// Print epics for an SRS file as JSON
    Epics {
        /// SRS text file
        file: PathBuf,
    },

    /// Print milestones for an SRS file as JSON
    Milestones {
        /// SRS text file
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List all projects
    List,

    /// Show a project's epics and milestones
    Show {
        /// Project id (or unique prefix)
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// List tasks
    List {
        /// Only tasks of this project (id or prefix)
        #[clap(long, short = 'p')]
        project: Option<String>,
    },

    /// Show a task
    Show {
        /// Task id (or unique prefix)
        id: String,
    },

    /// Add a task to an epic
    Add {
        /// Project id (or unique prefix)
        #[clap(long, short = 'p')]
        project: String,

        /// Epic to add the task to; created if missing
        #[clap(long)]
        epic: Option<String>,

        /// Task name
        #[clap(long)]
        name: Option<String>,

        /// Timeline in days
        #[clap(long)]
        days: Option<u32>,

        /// Status (backlog, progress, done)
        #[clap(long)]
        status: Option<String>,

        /// Assignee
        #[clap(long)]
        assignee: Option<String>,

        /// Use interactive mode (prompts)
        #[clap(long)]
        interactive: bool,
    },

    /// Update a task
    Update {
        /// Task id (or unique prefix)
        id: String,

        /// New task name
        #[clap(long)]
        name: Option<String>,

        /// New timeline in days
        #[clap(long)]
        days: Option<u32>,

        /// New status (backlog, progress, done)
        #[clap(long)]
        status: Option<String>,

        /// New assignee
        #[clap(long)]
        assignee: Option<String>,
    },

    /// Delete a task
    Del {
        /// Task id (or unique prefix)
        id: String,

        /// Skip confirmation
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Copy the current database into another file (backend from extension; .json exports, a .json --db imports)
    Migrate {
        /// Destination path
        dest: PathBuf,
    },

    /// Print the path to the database file
    Path,

    /// Show database statistics
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze an SRS file and store the result as a new project
    Analyze {
        /// SRS text file
        file: PathBuf,

        /// Project name (defaults to the file stem)
        #[clap(long)]
        name: Option<String>,
    },

    /// Generate epics or milestones without storing them
    #[clap(subcommand)]
    Generate(GenerateCommand),

    /// Project commands
    #[clap(subcommand)]
    Project(ProjectCommand),

    /// Task commands
    #[clap(subcommand)]
    Task(TaskCommand),

    /// Allocate a project's tasks to a team
    Allocate {
        /// Project id (or unique prefix)
        #[clap(long, short = 'p')]
        project: String,

        /// JSON file with the team members
        #[clap(long)]
        team: PathBuf,

        /// Show the allocations without recording them
        #[clap(long)]
        dry_run: bool,
    },

    /// Export a project board
    Export {
        /// Project id (or unique prefix)
        #[clap(long, short = 'p')]
        project: String,

        /// Output format (markdown, json)
        #[clap(long, short = 'f', default_value = "markdown")]
        format: String,

        /// Output file path
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Database commands
    #[clap(subcommand)]
    Db(DbCommand),

    /// Configuration commands
    #[clap(subcommand)]
    Config(ConfigCommand),
}
