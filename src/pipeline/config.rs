//! Sweep configuration.
//!
//! Holds the dataset root, the task categories to visit and the courtesy
//! delay between backend calls. Validation happens before any unit is
//! touched, so a bad configuration aborts the run instead of failing every
//! unit one by one.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::categories::TaskCode;
use crate::dataset::WorkEnumerator;
use crate::error::ConfigError;

/// Delay after each persisted unit for text stages (refine, objects, evaluate).
pub const DEFAULT_TEXT_DELAY_SECS: u64 = 10;

/// Delay after each persisted unit for image generation.
pub const DEFAULT_GENERATION_DELAY_SECS: u64 = 5;

/// Configuration for one sweep over the dataset.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Dataset root containing one directory per task category.
    pub root: PathBuf,
    /// Task categories to visit, in lexical directory order.
    pub tasks: Vec<TaskCode>,
    /// Pause after each successfully persisted unit. Zero disables it.
    pub delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            tasks: TaskCode::all(),
            delay: Duration::from_secs(DEFAULT_TEXT_DELAY_SECS),
        }
    }
}

impl SweepConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IMAGEN_FORGE_ROOT`: Dataset root (required)
    /// - `IMAGEN_FORGE_TASKS`: Comma-separated task codes (default: all six)
    /// - `IMAGEN_FORGE_DELAY_SECS`: Delay between units (default: 10)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = std::env::var("IMAGEN_FORGE_ROOT")
            .map_err(|_| ConfigError::MissingEnvVar("IMAGEN_FORGE_ROOT".to_string()))?;
        let mut config = Self::new(root);

        if let Ok(val) = std::env::var("IMAGEN_FORGE_TASKS") {
            config.tasks = parse_task_list(&val)?;
        }

        if let Ok(val) = std::env::var("IMAGEN_FORGE_DELAY_SECS") {
            let secs: u64 = parse_env_value(&val, "IMAGEN_FORGE_DELAY_SECS")?;
            config.delay = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if the root is not an existing
    /// directory or no task category is selected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::ValidationFailed(format!(
                "dataset root '{}' is not a directory",
                self.root.display()
            )));
        }

        if self.tasks.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one task category must be selected".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskCode>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Enumerator over the selected task categories.
    pub fn enumerator(&self) -> WorkEnumerator {
        let enumerator = WorkEnumerator::new(&self.root);
        if self.all_tasks() {
            enumerator
        } else {
            enumerator.with_tasks(self.tasks.clone())
        }
    }

    /// True when the sweep visits every task category.
    pub fn all_tasks(&self) -> bool {
        TaskCode::all().iter().all(|t| self.tasks.contains(t))
    }
}

/// Parses a comma-separated list of task codes, ignoring blanks and duplicates.
pub fn parse_task_list(value: &str) -> Result<Vec<TaskCode>, ConfigError> {
    let mut tasks = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let task = TaskCode::from_str(raw).map_err(|message| ConfigError::InvalidValue {
            key: "tasks".to_string(),
            message,
        })?;
        if !tasks.contains(&task) {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
