//! Planner configuration
//!
//! Loaded from YAML, with environment overrides for the model settings.
//! The resulting value is passed explicitly to the model client and planner.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_CONFIG_PATH: &str = "MILESTONEX_CONFIG";
pub const ENV_MODEL: &str = "MILESTONEX_MODEL";
pub const ENV_OLLAMA_URL: &str = "MILESTONEX_OLLAMA_URL";
pub const ENV_BACKEND: &str = "MILESTONEX_BACKEND";

/// Which model backend the client talks to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    /// Local Ollama server over HTTP
    #[default]
    Ollama,
    /// Claude CLI with --print
    ClaudeCli,
    /// No model; every unit of work goes to the fallback synthesizer
    Disabled,
}

impl FromStr for ModelBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ollama" => Ok(ModelBackend::Ollama),
            "claude" | "claude_cli" => Ok(ModelBackend::ClaudeCli),
            "disabled" | "none" | "off" => Ok(ModelBackend::Disabled),
            _ => anyhow::bail!("Unknown model backend: {}", s),
        }
    }
}

/// Settings for the model invocation adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    /// Model name, e.g. "phi3:mini"
    pub model: String,
    pub temperature: f32,
    /// Context window passed to the model
    pub num_ctx: u32,
    /// Base URL of the Ollama server
    pub endpoint: String,
    /// Explicit path to the Claude CLI (searched on PATH otherwise)
    pub claude_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Ollama,
            model: "phi3:mini".to_string(),
            temperature: 0.1,
            num_ctx: 4096,
            endpoint: "http://localhost:11434".to_string(),
            claude_path: None,
            timeout_secs: 120,
        }
    }
}

/// A keyword bucket used to group fallback tasks into epics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyBucket {
    pub epic_name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl TaxonomyBucket {
    pub fn new(epic_name: &str, description: &str, keywords: &[&str]) -> Self {
        Self {
            epic_name: epic_name.to_string(),
            description: description.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Case-insensitive substring match against any keyword
    pub fn matches(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.keywords
            .iter()
            .any(|kw| !kw.is_empty() && line.contains(&kw.to_lowercase()))
    }
}

/// The built-in taxonomy used when none is configured
pub fn default_taxonomy() -> Vec<TaxonomyBucket> {
    vec![
        TaxonomyBucket::new(
            "User Management",
            "Tasks related to User Management",
            &["user", "registration", "login", "profile", "password", "auth"],
        ),
        TaxonomyBucket::new(
            "Admin Dashboard",
            "Tasks related to Admin Dashboard",
            &["admin", "report", "dashboard"],
        ),
        TaxonomyBucket::new(
            "Content Management",
            "Tasks related to Content Management",
            &["content", "edit", "upload"],
        ),
        TaxonomyBucket::new(
            "Deployment",
            "Tasks related to Deployment",
            &["deploy", "cloud", "server"],
        ),
    ]
}

/// Top-level configuration for the planning pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub model: ModelConfig,
    /// Upper bound on chunk length, in characters
    pub chunk_size: usize,
    /// Segments at or below this many characters are dropped
    pub min_segment_len: usize,
    /// Display bound for synthesized task names, in characters
    pub max_task_name_len: usize,
    /// Task timelines at or above this are rejected
    pub task_timeline_ceiling: u32,
    /// Milestone timelines at or above this are rejected
    pub milestone_timeline_ceiling: u32,
    pub timeline_min: u32,
    pub timeline_max: u32,
    /// Seed for the timeline estimator; entropy when unset
    pub seed: Option<u64>,
    /// Process chunks on scoped threads instead of one after another
    pub parallel_batches: bool,
    /// Keyword buckets for fallback epics; empty means a single catch-all epic
    pub fallback_taxonomy: Vec<TaxonomyBucket>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            chunk_size: 800,
            min_segment_len: 5,
            max_task_name_len: 120,
            task_timeline_ceiling: 365,
            milestone_timeline_ceiling: 1000,
            timeline_min: 1,
            timeline_max: 5,
            seed: None,
            parallel_batches: false,
            fallback_taxonomy: default_taxonomy(),
        }
    }
}

impl PlannerConfig {
    /// Loads a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Loads a config file, or returns defaults when it doesn't exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolves the effective configuration: explicit path, then
    /// `MILESTONEX_CONFIG`, then the per-user default location.
    /// Environment overrides are applied and the result validated.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => get_config_path()?,
        };
        let mut config = Self::load_or_default(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.model.model = model.trim().to_string();
        }
        if let Some(url) = lookup(ENV_OLLAMA_URL).filter(|v| !v.trim().is_empty()) {
            self.model.endpoint = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(backend) = lookup(ENV_BACKEND).and_then(|v| v.parse::<ModelBackend>().ok()) {
            self.model.backend = backend;
        }
    }

    /// Rejects settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.max_task_name_len == 0 {
            anyhow::bail!("max_task_name_len must be greater than zero");
        }
        if self.timeline_min == 0 || self.timeline_min > self.timeline_max {
            anyhow::bail!(
                "timeline range {}..={} is empty or starts at zero",
                self.timeline_min,
                self.timeline_max
            );
        }
        if self.task_timeline_ceiling <= self.timeline_max {
            anyhow::bail!(
                "task_timeline_ceiling ({}) must exceed timeline_max ({})",
                self.task_timeline_ceiling,
                self.timeline_max
            );
        }
        if self.milestone_timeline_ceiling <= 1 {
            anyhow::bail!("milestone_timeline_ceiling must be greater than one");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!("model temperature {} is out of range", self.model.temperature);
        }
        Ok(())
    }

    pub fn timeline_range(&self) -> RangeInclusive<u32> {
        self.timeline_min..=self.timeline_max
    }

    /// Writes the config as YAML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;

    Ok(config_dir.join("milestonex").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let config = PlannerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.timeline_range(), 1..=5);
        assert_eq!(config.fallback_taxonomy.len(), 4);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "chunk_size: 200\nmodel:\n  model: llama3\n";
        let config: PlannerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.model.model, "llama3");
        assert_eq!(config.model.num_ctx, 4096);
        assert_eq!(config.max_task_name_len, 120);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_MODEL, "qwen2"),
            (ENV_OLLAMA_URL, "http://gpu-box:11434/"),
            (ENV_BACKEND, "disabled"),
        ]
        .into_iter()
        .collect();
        let mut config = PlannerConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.model.model, "qwen2");
        assert_eq!(config.model.endpoint, "http://gpu-box:11434");
        assert_eq!(config.model.backend, ModelBackend::Disabled);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Claude-CLI".parse::<ModelBackend>().ok(), Some(ModelBackend::ClaudeCli));
        assert_eq!(" ollama ".parse::<ModelBackend>().ok(), Some(ModelBackend::Ollama));
        assert!("gpt".parse::<ModelBackend>().is_err());

        let mut config = PlannerConfig::default();
        config.apply_overrides(|k| (k == ENV_BACKEND).then(|| "gpt".to_string()));
        assert_eq!(config.model.backend, ModelBackend::Ollama);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = PlannerConfig::default();
        config.timeline_min = 6;
        assert!(config.validate().is_err());

        let mut config = PlannerConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = PlannerConfig::default();
        config.seed = Some(9);
        config.fallback_taxonomy.clear();
        config.save(&path).unwrap();

        let loaded = PlannerConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);

        let missing = PlannerConfig::load_or_default(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(missing, PlannerConfig::default());
    }

    #[test]
    fn test_taxonomy_matching_is_case_insensitive() {
        let bucket = TaxonomyBucket::new("Deployment", "", &["Deploy"]);
        assert!(bucket.matches("The system shall DEPLOY to the cloud"));
        assert!(!bucket.matches("User can login"));
    }
}
