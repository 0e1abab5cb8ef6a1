//! Planning pipeline
//!
//! Chunker -> model -> parser -> reconciler -> merger, with the fallback
//! synthesizer standing in for any unit the model could not answer. The
//! only hard failure is SRS text with nothing usable in it.

use std::sync::{Mutex, MutexGuard};
use std::thread;

use thiserror::Error;

use crate::ai::allocation::reconcile_allocation_values;
use crate::ai::client::{AiError, ModelAdapter};
use crate::ai::prompts::{build_allocation_prompt, build_epics_prompt, build_milestones_prompt};
use crate::ai::reconcile::{ReconcileReport, Reconciler, TimelineLimits};
use crate::ai::responses::{parse_with, ParseFailure, ALLOCATION_SHAPE, EPIC_SHAPE, MILESTONE_SHAPE};
use crate::chunker::chunk_with;
use crate::config::PlannerConfig;
use crate::estimator::{RandomEstimator, TimelineEstimator};
use crate::fallback::{synthesize_milestones, FallbackSynthesizer};
use crate::merge::merge;
use crate::models::{Allocation, Chunk, Epic, Milestone, ProjectAnalysis, TaskView, TeamMember};

/// Model calls allowed in flight at once when batches run in parallel
const MAX_IN_FLIGHT: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("SRS text is empty or contains no usable requirements")]
    EmptyInput,
}

/// What happened during one generation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Units of work processed (chunks, or one per milestone/allocation call)
    pub units: usize,
    /// Units answered from model output
    pub model_units: usize,
    /// Units answered by the fallback synthesizer
    pub fallback_units: usize,
    pub reconcile: ReconcileReport,
}

impl GenerationReport {
    pub fn defaults_applied(&self) -> usize {
        self.reconcile.defaults.len()
    }

    pub fn items_rejected(&self) -> usize {
        self.reconcile.rejections.len()
    }

    fn absorb(&mut self, other: GenerationReport) {
        self.units += other.units;
        self.model_units += other.model_units;
        self.fallback_units += other.fallback_units;
        self.reconcile.absorb(other.reconcile);
    }
}

/// Why a unit of work fell back
#[derive(Debug)]
enum UnitFailure {
    Model(AiError),
    Parse(ParseFailure),
    NothingUsable,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitFailure::Model(e) => write!(f, "model invocation failed: {}", e),
            UnitFailure::Parse(e) => write!(f, "{}", e),
            UnitFailure::NothingUsable => write!(f, "no valid items after reconciliation"),
        }
    }
}

/// Turns SRS text into epics, milestones and allocations
pub struct Planner {
    model: Box<dyn ModelAdapter>,
    config: PlannerConfig,
    estimator: Mutex<Box<dyn TimelineEstimator>>,
    fallback: FallbackSynthesizer,
}

impl Planner {
    /// Create a planner whose timeline estimates come from the configured
    /// range and seed.
    pub fn new(model: Box<dyn ModelAdapter>, config: PlannerConfig) -> Self {
        let estimator = RandomEstimator::new(config.seed, config.timeline_range());
        Self::with_estimator(model, config, Box::new(estimator))
    }

    pub fn with_estimator(
        model: Box<dyn ModelAdapter>,
        config: PlannerConfig,
        estimator: Box<dyn TimelineEstimator>,
    ) -> Self {
        let fallback = FallbackSynthesizer::from_config(&config);
        Self {
            model,
            config,
            estimator: Mutex::new(estimator),
            fallback,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn model_description(&self) -> String {
        self.model.describe()
    }

    fn limits(&self) -> TimelineLimits {
        TimelineLimits {
            task_ceiling: self.config.task_timeline_ceiling,
            milestone_ceiling: self.config.milestone_timeline_ceiling,
        }
    }

    fn lock_estimator(&self) -> MutexGuard<'_, Box<dyn TimelineEstimator>> {
        self.estimator.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn chunks(&self, srs_text: &str) -> Result<Vec<Chunk>, PlannerError> {
        if srs_text.trim().is_empty() {
            return Err(PlannerError::EmptyInput);
        }
        let chunks = chunk_with(srs_text, self.config.chunk_size, self.config.min_segment_len);
        if chunks.is_empty() {
            return Err(PlannerError::EmptyInput);
        }
        Ok(chunks)
    }

    /// Send every prompt to the model, in parallel windows when configured.
    /// Results come back in submission order regardless of completion order.
    fn complete_all(&self, prompts: &[String]) -> Vec<Result<String, AiError>> {
        if !self.config.parallel_batches || prompts.len() < 2 {
            return prompts.iter().map(|p| self.model.complete(p)).collect();
        }

        let model = self.model.as_ref();
        let mut results = Vec::with_capacity(prompts.len());
        for window in prompts.chunks(MAX_IN_FLIGHT) {
            thread::scope(|scope| {
                let handles: Vec<_> = window
                    .iter()
                    .map(|prompt| scope.spawn(move || model.complete(prompt)))
                    .collect();
                for handle in handles {
                    results.push(handle.join().unwrap_or_else(|_| {
                        Err(AiError::RequestFailed("model worker panicked".to_string()))
                    }));
                }
            });
        }
        results
    }

    /// Generate merged epics for the SRS text
    pub fn generate_epics(&self, srs_text: &str) -> Result<Vec<Epic>, PlannerError> {
        self.generate_epics_with_report(srs_text).map(|(epics, _)| epics)
    }

    pub fn generate_epics_with_report(
        &self,
        srs_text: &str,
    ) -> Result<(Vec<Epic>, GenerationReport), PlannerError> {
        let chunks = self.chunks(srs_text)?;
        let prompts: Vec<String> = chunks.iter().map(|c| build_epics_prompt(&c.text)).collect();
        let replies = self.complete_all(&prompts);

        let mut report = GenerationReport::default();
        let mut estimator = self.lock_estimator();
        let mut batches = Vec::with_capacity(chunks.len());

        for (chunk, reply) in chunks.iter().zip(replies) {
            report.units += 1;
            let mut reconciler = Reconciler::new(estimator.as_mut(), self.limits());
            let outcome = epics_from_reply(reply, &mut reconciler);
            report.reconcile.absorb(reconciler.into_report());

            match outcome {
                Ok(epics) => {
                    report.model_units += 1;
                    batches.push(epics);
                }
                Err(failure) => {
                    log::warn!("Chunk {} falling back: {}", chunk.index, failure);
                    report.fallback_units += 1;
                    batches.push(
                        self.fallback
                            .synthesize(std::slice::from_ref(chunk), estimator.as_mut()),
                    );
                }
            }
        }

        let mut epics = merge(batches.into_iter().flatten());
        if epics.is_empty() {
            log::warn!("No epics from any unit; synthesizing from the whole document");
            epics = FallbackSynthesizer::new(
                self.config.fallback_taxonomy.clone(),
                self.config.max_task_name_len,
                0,
            )
            .synthesize(&chunks, estimator.as_mut());
        }

        log::info!(
            "Generated {} epics from {} chunks ({} by model, {} by fallback)",
            epics.len(),
            report.units,
            report.model_units,
            report.fallback_units
        );
        Ok((epics, report))
    }

    /// Generate milestones for the SRS text
    pub fn generate_milestones(&self, srs_text: &str) -> Result<Vec<Milestone>, PlannerError> {
        self.generate_milestones_with_report(srs_text)
            .map(|(milestones, _)| milestones)
    }

    pub fn generate_milestones_with_report(
        &self,
        srs_text: &str,
    ) -> Result<(Vec<Milestone>, GenerationReport), PlannerError> {
        let chunks = self.chunks(srs_text)?;
        Ok(self.milestones_for(srs_text, &chunks, None))
    }

    /// When the model fails, milestones are derived from `epics` if given,
    /// otherwise from fallback epics for the document.
    fn milestones_for(
        &self,
        srs_text: &str,
        chunks: &[Chunk],
        epics: Option<&[Epic]>,
    ) -> (Vec<Milestone>, GenerationReport) {
        let mut report = GenerationReport {
            units: 1,
            ..GenerationReport::default()
        };
        let reply = self.model.complete(&build_milestones_prompt(srs_text));

        let mut estimator = self.lock_estimator();
        let mut reconciler = Reconciler::new(estimator.as_mut(), self.limits());
        let outcome = milestones_from_reply(reply, &mut reconciler);
        report.reconcile.absorb(reconciler.into_report());

        match outcome {
            Ok(milestones) => {
                report.model_units = 1;
                (milestones, report)
            }
            Err(failure) => {
                log::warn!("Milestones falling back: {}", failure);
                report.fallback_units = 1;
                let ceiling = self.config.milestone_timeline_ceiling;
                let milestones = match epics {
                    Some(epics) => synthesize_milestones(epics, ceiling),
                    None => {
                        let epics = self.fallback.synthesize(chunks, estimator.as_mut());
                        synthesize_milestones(&epics, ceiling)
                    }
                };
                (milestones, report)
            }
        }
    }

    /// Generate both epics and milestones for one document
    pub fn analyze(&self, srs_text: &str) -> Result<ProjectAnalysis, PlannerError> {
        self.analyze_with_report(srs_text).map(|(analysis, _)| analysis)
    }

    pub fn analyze_with_report(
        &self,
        srs_text: &str,
    ) -> Result<(ProjectAnalysis, GenerationReport), PlannerError> {
        let (epics, mut report) = self.generate_epics_with_report(srs_text)?;
        let chunks = self.chunks(srs_text)?;
        let (milestones, milestone_report) = self.milestones_for(srs_text, &chunks, Some(&epics));
        report.absorb(milestone_report);
        Ok((ProjectAnalysis { epics, milestones }, report))
    }

    /// Ask the model to assign tasks to team members. Only allocations that
    /// reference supplied tasks and members survive; a failed model call
    /// yields none.
    pub fn allocate(&self, tasks: &[TaskView], team: &[TeamMember]) -> Vec<Allocation> {
        self.allocate_with_report(tasks, team).0
    }

    pub fn allocate_with_report(
        &self,
        tasks: &[TaskView],
        team: &[TeamMember],
    ) -> (Vec<Allocation>, GenerationReport) {
        let mut report = GenerationReport::default();
        if tasks.is_empty() || team.is_empty() {
            return (Vec::new(), report);
        }
        report.units = 1;

        let values = self
            .model
            .complete(&build_allocation_prompt(tasks, team))
            .map_err(UnitFailure::Model)
            .and_then(|raw| parse_with(&raw, &ALLOCATION_SHAPE).map_err(UnitFailure::Parse));

        match values {
            Ok(values) => {
                report.model_units = 1;
                let allocations =
                    reconcile_allocation_values(tasks, team, &values, &mut report.reconcile);
                (allocations, report)
            }
            Err(failure) => {
                log::warn!("Allocation produced nothing: {}", failure);
                (Vec::new(), report)
            }
        }
    }
}

fn epics_from_reply(
    reply: Result<String, AiError>,
    reconciler: &mut Reconciler<'_>,
) -> Result<Vec<Epic>, UnitFailure> {
    let raw = reply.map_err(UnitFailure::Model)?;
    let values = parse_with(&raw, &EPIC_SHAPE).map_err(UnitFailure::Parse)?;
    let epics: Vec<Epic> = reconciler
        .reconcile_epics(&values)
        .into_iter()
        .filter(|epic| !epic.tasks.is_empty())
        .collect();
    if epics.is_empty() {
        return Err(UnitFailure::NothingUsable);
    }
    Ok(epics)
}

fn milestones_from_reply(
    reply: Result<String, AiError>,
    reconciler: &mut Reconciler<'_>,
) -> Result<Vec<Milestone>, UnitFailure> {
    let raw = reply.map_err(UnitFailure::Model)?;
    let values = parse_with(&raw, &MILESTONE_SHAPE).map_err(UnitFailure::Parse)?;
    let milestones = reconciler.reconcile_milestones(&values);
    if milestones.is_empty() {
        return Err(UnitFailure::NothingUsable);
    }
    Ok(milestones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::stub::StubModel;
    use crate::estimator::FixedEstimator;
    use crate::models::TaskStatus;

    const SRS: &str = "User can login and upload files. Admin can manage users and generate reports.";

    fn planner(stub: StubModel, config: PlannerConfig) -> Planner {
        Planner::with_estimator(Box::new(stub), config, Box::new(FixedEstimator(2)))
    }

    #[test]
    fn test_empty_input_is_the_only_hard_failure() {
        let p = planner(StubModel::new(), PlannerConfig::default());
        assert_eq!(p.generate_epics("   \n "), Err(PlannerError::EmptyInput));
        assert_eq!(p.generate_milestones(""), Err(PlannerError::EmptyInput));
        assert_eq!(p.generate_epics("1.\n2.\n"), Err(PlannerError::EmptyInput));
    }

    #[test]
    fn test_model_output_is_reconciled_and_merged() {
        let reply = r#"```json
[
  {"Epic Name": "Auth", "tasks": [{"taskName": "Login form", "days": 3}]},
  {"epic_name": "auth", "description": "dup", "tasks": [{"task_name": "Logout", "timeline_days": 1, "status": "Done"}]}
]
```"#;
        let p = planner(StubModel::always(reply), PlannerConfig::default());
        let (epics, report) = p.generate_epics_with_report(SRS).unwrap();
        assert_eq!(epics.len(), 1);
        assert_eq!(epics[0].epic_name, "Auth");
        assert_eq!(epics[0].description, "Implementation of Auth module.");
        assert_eq!(epics[0].tasks.len(), 2);
        assert_eq!(epics[0].tasks[1].sequence, 2);
        assert_eq!(epics[0].tasks[1].status, TaskStatus::Backlog);
        assert_eq!(report.model_units, 1);
        assert_eq!(report.fallback_units, 0);
        assert!(report.defaults_applied() > 0);
    }

    #[test]
    fn test_failing_model_falls_back() {
        let p = planner(StubModel::new().fail("timeout"), PlannerConfig::default());
        let (epics, report) = p.generate_epics_with_report(SRS).unwrap();
        assert!(!epics.is_empty());
        assert_eq!(report.fallback_units, 1);
        assert!(epics.iter().all(|e| !e.tasks.is_empty()));
    }

    #[test]
    fn test_per_chunk_fallback_keeps_model_results() {
        let config = PlannerConfig {
            chunk_size: 50,
            ..PlannerConfig::default()
        };
        let reply = r#"[{"epic_name": "Uploads", "tasks": ["Upload files"]}]"#;
        let p = planner(StubModel::new().reply(reply).reply("no idea"), config);
        let (epics, report) = p.generate_epics_with_report(SRS).unwrap();
        assert_eq!(report.units, 2);
        assert_eq!(report.model_units, 1);
        assert_eq!(report.fallback_units, 1);
        assert_eq!(epics[0].epic_name, "Uploads");
        assert!(epics.len() >= 2);
    }

    /// Replies per chunk; the first chunk answers last
    struct SlowFirstChunk;

    impl ModelAdapter for SlowFirstChunk {
        fn complete(&self, prompt: &str) -> Result<String, AiError> {
            if prompt.contains("User can login") {
                thread::sleep(std::time::Duration::from_millis(150));
                Ok(r#"[{"epic_name": "Accounts", "tasks": ["Login", "Upload"]}]"#.to_string())
            } else {
                Ok(r#"[{"epic_name": "Admin", "tasks": ["Manage users", "Reports"]}]"#.to_string())
            }
        }

        fn describe(&self) -> String {
            "slow-first".to_string()
        }
    }

    #[test]
    fn test_parallel_batches_keep_submission_order() {
        let run = |parallel_batches: bool| {
            let config = PlannerConfig {
                chunk_size: 50,
                parallel_batches,
                ..PlannerConfig::default()
            };
            Planner::with_estimator(Box::new(SlowFirstChunk), config, Box::new(FixedEstimator(2)))
                .generate_epics(SRS)
                .unwrap()
        };

        let parallel = run(true);
        assert_eq!(parallel, run(false));

        let names: Vec<&str> = parallel.iter().map(|e| e.epic_name.as_str()).collect();
        assert_eq!(names, ["Accounts", "Admin"]);
        let tasks: Vec<&str> = parallel[0].tasks.iter().map(|t| t.task_name.as_str()).collect();
        assert_eq!(tasks, ["Login", "Upload"]);
    }

    #[test]
    fn test_milestones_from_model_with_sanity_filter() {
        let reply = r#"{"milestones": [
            {"name": "Kickoff", "timeline_days": 0},
            {"Name": "MVP", "days": "30"},
            {"name": "Someday", "timeline_days": 5000}
        ]}"#;
        let p = planner(StubModel::always(reply), PlannerConfig::default());
        let milestones = p.generate_milestones(SRS).unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].name, "MVP");
        assert_eq!(milestones[0].timeline_days, 30);
    }

    #[test]
    fn test_analyze_fallback_milestones_follow_epics() {
        let p = planner(StubModel::new(), PlannerConfig::default());
        let analysis = p.analyze(SRS).unwrap();
        assert!(analysis.task_count() >= 2);
        assert_eq!(analysis.milestones.len(), analysis.epics.len());
        let last = analysis.milestones.last().unwrap();
        assert_eq!(last.timeline_days, analysis.task_count() as u32 * 2);
    }

    #[test]
    fn test_allocate_skips_model_without_input() {
        let stub = StubModel::new();
        let p = planner(stub, PlannerConfig::default());
        let (allocations, report) = p.allocate_with_report(&[], &[TeamMember::new("A", 5)]);
        assert!(allocations.is_empty());
        assert_eq!(report.units, 0);
    }

    #[test]
    fn test_allocate_drops_dangling_references() {
        let reply = r#"[{"task_name": "Login", "assigned_to": "Prerna"}, {"task_name": "Login", "assigned_to": "Ghost"}]"#;
        let p = planner(StubModel::always(reply), PlannerConfig::default());
        let tasks = vec![TaskView {
            task_name: "Login".to_string(),
            timeline_days: 2,
            epic_name: "Auth".to_string(),
        }];
        let team = vec![TeamMember::new("Prerna", 10)];
        let (allocations, report) = p.allocate_with_report(&tasks, &team);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].assigned_to, "Prerna");
        assert_eq!(report.items_rejected(), 1);
    }
}
