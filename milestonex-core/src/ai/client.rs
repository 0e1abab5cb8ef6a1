//! AI Client Module
//!
//! Handles communication with the language model, either a local Ollama
//! server or the Claude CLI. The client only returns raw text; parsing and
//! reconciliation happen elsewhere.

use crate::chunker::truncate_chars;
use crate::config::{ModelBackend, ModelConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during AI operations
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Claude CLI not found at {0}")]
    CliNotFound(PathBuf),

    #[error("Claude CLI execution failed: {0}")]
    CliExecFailed(String),

    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid response from AI: {0}")]
    InvalidResponse(String),

    #[error("AI integration not available")]
    NotAvailable,
}

/// Anything that can turn a prompt into raw model text
pub trait ModelAdapter: Send + Sync {
    /// Sends the prompt and returns the model's raw output
    fn complete(&self, prompt: &str) -> Result<String, AiError>;

    /// Short human-readable description of the backend
    fn describe(&self) -> String;
}

/// AI operation mode
#[derive(Debug, Clone, Default)]
pub enum AiMode {
    /// Ollama HTTP API at the given base URL
    Ollama { endpoint: String },
    /// Use Claude CLI with --print flag
    ClaudeCli { path: PathBuf },
    /// AI features disabled
    #[default]
    Disabled,
}

/// AI Client for the configured model backend
#[derive(Debug, Clone)]
pub struct AiClient {
    mode: AiMode,
    config: ModelConfig,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

impl AiClient {
    /// Create a client for the configured backend
    pub fn from_config(config: &ModelConfig) -> Self {
        let mode = match config.backend {
            ModelBackend::Ollama => AiMode::Ollama {
                endpoint: config.endpoint.trim_end_matches('/').to_string(),
            },
            ModelBackend::ClaudeCli => {
                let path = config.claude_path.clone().or_else(Self::find_claude_cli);
                match path {
                    Some(path) => AiMode::ClaudeCli { path },
                    None => {
                        log::warn!("Claude CLI not found; AI generation disabled");
                        AiMode::Disabled
                    }
                }
            }
            ModelBackend::Disabled => AiMode::Disabled,
        };
        Self {
            mode,
            config: config.clone(),
        }
    }

    /// Create a client with a specific mode
    pub fn with_mode(mode: AiMode, config: ModelConfig) -> Self {
        Self { mode, config }
    }

    /// Find the claude CLI executable
    fn find_claude_cli() -> Option<PathBuf> {
        if let Ok(output) = Command::new("which").arg("claude").output() {
            if output.status.success() {
                let path_str = String::from_utf8_lossy(&output.stdout);
                let path = PathBuf::from(path_str.trim());
                if path.exists() {
                    return Some(path);
                }
            }
        }

        ["/usr/local/bin/claude", "/usr/bin/claude"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Check if AI features are available
    pub fn is_available(&self) -> bool {
        match &self.mode {
            AiMode::Ollama { endpoint } => !endpoint.is_empty(),
            AiMode::ClaudeCli { path } => path.exists(),
            AiMode::Disabled => false,
        }
    }

    /// Get the current mode
    pub fn mode(&self) -> &AiMode {
        &self.mode
    }

    /// Get a description of the current mode
    pub fn mode_description(&self) -> String {
        match &self.mode {
            AiMode::Ollama { endpoint } => format!("Ollama {} ({})", self.config.model, endpoint),
            AiMode::ClaudeCli { path } => format!("Claude CLI ({})", path.display()),
            AiMode::Disabled => "Disabled".to_string(),
        }
    }

    /// Send a request to the AI
    fn send_request(&self, prompt: &str) -> Result<String, AiError> {
        match &self.mode {
            AiMode::Ollama { endpoint } => self.send_ollama_request(endpoint, prompt),
            AiMode::ClaudeCli { path } => self.send_cli_request(path, prompt),
            AiMode::Disabled => Err(AiError::NotAvailable),
        }
    }

    /// Send request to Ollama's non-streaming generate endpoint
    fn send_ollama_request(&self, endpoint: &str, prompt: &str) -> Result<String, AiError> {
        let timeout = self.config.timeout_secs;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let body = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.num_ctx,
            },
        };

        let response = client
            .post(format!("{}/api/generate", endpoint))
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(timeout)
                } else {
                    AiError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(AiError::RequestFailed(format!(
                "HTTP {}: {}",
                status,
                truncate_chars(&text, 200)
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        if parsed.response.trim().is_empty() {
            return Err(AiError::InvalidResponse("Empty response from Ollama".to_string()));
        }

        Ok(parsed.response)
    }

    /// Send request via Claude CLI
    fn send_cli_request(&self, cli_path: &Path, prompt: &str) -> Result<String, AiError> {
        if !cli_path.exists() {
            return Err(AiError::CliNotFound(cli_path.to_path_buf()));
        }

        let output = Command::new(cli_path)
            .arg("--print")
            .arg("-p")
            .arg(prompt)
            .output()
            .map_err(|e| AiError::CliExecFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AiError::CliExecFailed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).to_string();

        if response.is_empty() {
            return Err(AiError::InvalidResponse("Empty response from CLI".to_string()));
        }

        Ok(response)
    }
}

impl ModelAdapter for AiClient {
    fn complete(&self, prompt: &str) -> Result<String, AiError> {
        self.send_request(prompt)
    }

    fn describe(&self) -> String {
        self.mode_description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_mode() {
        let config = ModelConfig {
            backend: ModelBackend::Disabled,
            ..ModelConfig::default()
        };
        let client = AiClient::from_config(&config);
        assert!(!client.is_available());
        assert_eq!(client.mode_description(), "Disabled");
        assert!(matches!(client.complete("hi"), Err(AiError::NotAvailable)));
    }

    #[test]
    fn test_ollama_mode_from_config() {
        let config = ModelConfig {
            endpoint: "http://localhost:11434/".to_string(),
            ..ModelConfig::default()
        };
        let client = AiClient::from_config(&config);
        assert!(client.is_available());
        match client.mode() {
            AiMode::Ollama { endpoint } => assert_eq!(endpoint, "http://localhost:11434"),
            other => panic!("unexpected mode {:?}", other),
        }
        assert!(client.describe().contains("phi3:mini"));
    }

    #[test]
    fn test_missing_cli_path_is_reported() {
        let client = AiClient::with_mode(
            AiMode::ClaudeCli {
                path: PathBuf::from("/nonexistent/claude"),
            },
            ModelConfig::default(),
        );
        assert!(!client.is_available());
        assert!(matches!(client.complete("hi"), Err(AiError::CliNotFound(_))));
    }
}
