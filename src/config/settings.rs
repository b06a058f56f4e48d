//! TOML tuning file.
//!
//! Every key is optional; a missing file section falls back to the
//! built-in defaults. Unknown keys are rejected so typos surface early.
//!
//! ```toml
//! [engine]
//! workers = 3
//! batch_size = 10
//!
//! [generation]
//! model = "sonnet-4.5"
//!
//! [quality]
//! min_length = 1200
//!
//! [notes]
//! suffix = "Notes"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::DEFAULT_MAX_ATTEMPTS;
use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use crate::files::DEFAULT_NOTES_SUFFIX;
use crate::gate::{DEFAULT_MIN_QUALITY, Rubric};
use crate::llm::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::llm::{DEFAULT_MODEL_ALIAS, RetryPolicy, resolve_model};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub engine: EngineSettings,
    pub generation: GenerationSettings,
    pub quality: Rubric,
    pub notes: NotesSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub throttle_ms: u64,
    pub dequeue_timeout_ms: u64,
    pub max_input_chars: usize,
    pub min_quality: f64,
    pub max_waves: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            workers: engine.workers,
            batch_size: engine.batch_size,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            throttle_ms: engine.throttle.as_millis() as u64,
            dequeue_timeout_ms: engine.dequeue_timeout.as_millis() as u64,
            max_input_chars: engine.max_input_chars,
            min_quality: DEFAULT_MIN_QUALITY,
            max_waves: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSettings {
    /// Alias or full `claude-*` model id.
    pub model: String,
    /// Replaces the built-in system prompt when set.
    pub system_prompt_file: Option<PathBuf>,
    pub max_tokens: u64,
    pub timeout_secs: u64,
    /// Provider calls per task, including the first.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_ALIAS.to_string(),
            system_prompt_file: None,
            max_tokens: 8192,
            timeout_secs: 300,
            max_retries: 3,
            backoff_base_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotesSettings {
    pub suffix: String,
}

impl Default for NotesSettings {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_NOTES_SUFFIX.to_string(),
        }
    }
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings file {}: {e}", path.display()))
        })?;
        let settings = Self::parse(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.workers == 0 {
            return Err(Error::Config("engine.workers must be at least 1".to_string()));
        }
        if engine.batch_size == 0 {
            return Err(Error::Config("engine.batch_size must be at least 1".to_string()));
        }
        if engine.max_attempts == 0 {
            return Err(Error::Config("engine.max_attempts must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&engine.min_quality) {
            return Err(Error::Config(format!(
                "engine.min_quality must be within 0.0..=1.0, got {}",
                engine.min_quality
            )));
        }
        if self.generation.max_retries == 0 {
            return Err(Error::Config("generation.max_retries must be at least 1".to_string()));
        }
        if self.notes.suffix.trim().is_empty() {
            return Err(Error::Config("notes.suffix must not be empty".to_string()));
        }
        self.model_id()?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        let engine = &self.engine;
        EngineConfig {
            workers: engine.workers,
            batch_size: engine.batch_size,
            retry_failed: false,
            max_waves: engine.max_waves,
            throttle: Duration::from_millis(engine.throttle_ms),
            dequeue_timeout: Duration::from_millis(engine.dequeue_timeout_ms),
            max_input_chars: engine.max_input_chars,
            min_quality: engine.min_quality,
            record_runs: true,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.generation.max_retries,
            base_delay: Duration::from_millis(self.generation.backoff_base_ms),
            ..RetryPolicy::default()
        }
    }

    /// Provider id for the configured model.
    pub fn model_id(&self) -> Result<&str> {
        resolve_model(&self.generation.model)
            .ok_or_else(|| Error::Config(format!("unknown model: {}", self.generation.model)))
    }

    /// The configured system prompt, or the built-in one.
    pub fn system_prompt(&self) -> Result<String> {
        match &self.generation.system_prompt_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("cannot read system prompt {}: {e}", path.display()))
            }),
            None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}
