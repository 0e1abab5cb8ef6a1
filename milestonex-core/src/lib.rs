pub mod ai;
pub mod chunker;
pub mod config;
pub mod db;
pub mod estimator;
pub mod export;
pub mod fallback;
pub mod merge;
pub mod models;
pub mod planner;
pub mod project;
pub mod storage;

// Re-export commonly used types
pub use ai::{
    AiClient, AiError, AiMode, ModelAdapter, ParseFailure, ReconcileReport, StubModel,
    ValidationRejection,
};
pub use config::{get_config_path, ModelBackend, ModelConfig, PlannerConfig, TaxonomyBucket};
pub use estimator::{FixedEstimator, RandomEstimator, TimelineEstimator};
pub use export::{export_project, ExportFormat};
pub use fallback::FallbackSynthesizer;
pub use models::{
    normalize_name, Allocation, Chunk, Epic, Milestone, ProjectAnalysis, Task,
    TaskStatus, TaskView, TeamMember,
};
pub use planner::{GenerationReport, Planner, PlannerError};
pub use project::{determine_db_path, NewTask, PlanStore, Project, TaskRecord, TaskUpdate};
pub use storage::Storage;
