//! Fallback plan synthesis
//!
//! Used when the model gives nothing usable for a unit of work. Every
//! retained SRS line becomes one Backlog task, so the pipeline always has
//! something to show for non-empty input.

use crate::chunker::{segments_with, truncate_chars, DEFAULT_MIN_SEGMENT_LEN};
use crate::config::{default_taxonomy, PlannerConfig, TaxonomyBucket};
use crate::estimator::TimelineEstimator;
use crate::models::{Chunk, Epic, Milestone, Task};

/// Epic used when no taxonomy is configured
pub const CATCH_ALL_EPIC: &str = "Auto Epic from SRS";
pub const CATCH_ALL_DESCRIPTION: &str = "Tasks derived directly from the SRS text";

/// Residual epic for lines no taxonomy bucket matched
pub const OTHER_EPIC: &str = "Other Features";
pub const OTHER_DESCRIPTION: &str = "Miscellaneous tasks";

pub const DEFAULT_MAX_TASK_NAME_LEN: usize = 120;

/// Derives epics and milestones straight from SRS text
#[derive(Debug, Clone)]
pub struct FallbackSynthesizer {
    taxonomy: Vec<TaxonomyBucket>,
    max_task_name_len: usize,
    min_segment_len: usize,
}

impl Default for FallbackSynthesizer {
    fn default() -> Self {
        Self {
            taxonomy: default_taxonomy(),
            max_task_name_len: DEFAULT_MAX_TASK_NAME_LEN,
            min_segment_len: DEFAULT_MIN_SEGMENT_LEN,
        }
    }
}

impl FallbackSynthesizer {
    pub fn new(taxonomy: Vec<TaxonomyBucket>, max_task_name_len: usize, min_segment_len: usize) -> Self {
        Self {
            taxonomy,
            max_task_name_len: max_task_name_len.max(1),
            min_segment_len,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(
            config.fallback_taxonomy.clone(),
            config.max_task_name_len,
            config.min_segment_len,
        )
    }

    /// A synthesizer that puts every task under one catch-all epic
    pub fn without_taxonomy() -> Self {
        Self {
            taxonomy: Vec::new(),
            ..Self::default()
        }
    }

    /// One task per retained line across `chunks`, grouped by taxonomy
    /// bucket (first matching bucket wins) or under the catch-all epic.
    /// Empty input yields no epics.
    pub fn synthesize(&self, chunks: &[Chunk], estimator: &mut dyn TimelineEstimator) -> Vec<Epic> {
        let lines: Vec<String> = chunks
            .iter()
            .flat_map(|chunk| segments_with(&chunk.text, self.min_segment_len))
            .filter_map(|segment| self.task_name(&segment))
            .collect();

        if lines.is_empty() {
            return Vec::new();
        }

        if self.taxonomy.is_empty() {
            let mut epic = Epic::new(CATCH_ALL_EPIC, CATCH_ALL_DESCRIPTION);
            epic.tasks = build_tasks(lines, estimator);
            return vec![epic];
        }

        let mut buckets: Vec<Vec<String>> = vec![Vec::new(); self.taxonomy.len()];
        let mut other = Vec::new();
        for line in lines {
            match self.taxonomy.iter().position(|bucket| bucket.matches(&line)) {
                Some(i) => buckets[i].push(line),
                None => other.push(line),
            }
        }

        let mut epics = Vec::new();
        for (bucket, lines) in self.taxonomy.iter().zip(buckets) {
            if lines.is_empty() {
                continue;
            }
            let mut epic = Epic::new(bucket.epic_name.clone(), bucket.description.clone());
            epic.tasks = build_tasks(lines, estimator);
            epics.push(epic);
        }
        if !other.is_empty() {
            let mut epic = Epic::new(OTHER_EPIC, OTHER_DESCRIPTION);
            epic.tasks = build_tasks(other, estimator);
            epics.push(epic);
        }
        epics
    }

    fn task_name(&self, segment: &str) -> Option<String> {
        let trimmed = segment.trim().trim_end_matches(['.', '!', '?']).trim_end();
        let name = truncate_chars(trimmed, self.max_task_name_len);
        (!name.is_empty()).then_some(name)
    }
}

fn build_tasks(lines: Vec<String>, estimator: &mut dyn TimelineEstimator) -> Vec<Task> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| Task::new(line, estimator.estimate_days(), i as u32 + 1))
        .collect()
}

/// Synthesizes default-policy epics from chunks
pub fn synthesize(chunks: &[Chunk], estimator: &mut dyn TimelineEstimator) -> Vec<Epic> {
    FallbackSynthesizer::default().synthesize(chunks, estimator)
}

/// One milestone per epic, each landing when that epic's tasks would be
/// done if epics ran back to back. Timelines stay below `ceiling`.
pub fn synthesize_milestones(epics: &[Epic], ceiling: u32) -> Vec<Milestone> {
    let cap = ceiling.saturating_sub(1).max(1);
    let mut elapsed = 0u32;
    let mut milestones = Vec::new();

    for epic in epics {
        let days = epic.total_days();
        if days == 0 {
            continue;
        }
        elapsed = elapsed.saturating_add(days).min(cap);
        milestones.push(Milestone {
            name: format!("{} complete", epic.epic_name),
            description: format!("All {} tasks delivered", epic.epic_name),
            timeline_days: elapsed,
        });
    }
    milestones
}
