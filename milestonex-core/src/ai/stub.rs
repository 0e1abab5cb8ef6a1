use std::collections::VecDeque;
use std::sync::Mutex;

use super::client::{AiError, ModelAdapter};

/// Deterministic model adapter for tests and offline runs.
///
/// Plays back scripted replies (or failures) in order, then falls back to a
/// default reply. Every prompt it receives is recorded.
#[derive(Debug, Default)]
pub struct StubModel {
    script: Mutex<VecDeque<Result<String, String>>>,
    default_reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    /// A stub with no script; every call fails as unavailable
    pub fn new() -> Self {
        Self::default()
    }

    /// A stub that answers every prompt with the same text
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            default_reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Queue a reply
    pub fn reply(self, reply: impl Into<String>) -> Self {
        self.lock_script().push_back(Ok(reply.into()));
        self
    }

    /// Queue a failure
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.lock_script().push_back(Err(message.into()));
        self
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ModelAdapter for StubModel {
    fn complete(&self, prompt: &str) -> Result<String, AiError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        match self.lock_script().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AiError::RequestFailed(message)),
            None => self.default_reply.clone().ok_or(AiError::NotAvailable),
        }
    }

    fn describe(&self) -> String {
        "Stub".to_string()
    }
}
