use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use thiserror::Error;

use crate::runner::CandidatePolicy;
use crate::session::in_memory::DEFAULT_MAX_FIRINGS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// When rule sessions are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum SessionIsolation {
    /// A fresh session for every scenario.
    #[default]
    PerScenario,
    /// One session shared by all scenarios of a run.
    PerRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_suite_name")]
    pub suite_name: String,

    #[serde(default)]
    pub session_isolation: SessionIsolation,

    #[serde(default)]
    pub candidate_policy: CandidatePolicy,

    /// Applied to every session the runner acquires.
    #[serde(default = "default_max_rule_firings")]
    pub max_rule_firings: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            suite_name: default_suite_name(),
            session_isolation: SessionIsolation::default(),
            candidate_policy: CandidatePolicy::default(),
            max_rule_firings: default_max_rule_firings(),
        }
    }
}

impl RunnerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: RunnerConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(s: &str) -> ConfigResult<Self> {
        let config: RunnerConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rule_firings == 0 {
            return Err(ConfigError::Invalid(
                "max_rule_firings must be greater than 0".to_string(),
            ));
        }
        if self.suite_name.trim().is_empty() {
            return Err(ConfigError::Invalid("suite_name must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_suite_name() -> String {
    "Test Scenarios (Preview) tests".to_string()
}

fn default_max_rule_firings() -> usize {
    DEFAULT_MAX_FIRINGS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = RunnerConfig::from_str(r#"{"candidate_policy": "any_match"}"#).unwrap();
        assert_eq!(config.candidate_policy, CandidatePolicy::AnyMatch);
        assert_eq!(config.suite_name, "Test Scenarios (Preview) tests");
        assert_eq!(config.session_isolation, SessionIsolation::PerScenario);
        assert_eq!(config.max_rule_firings, 10_000);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"suite_name": "pricing", "session_isolation": "per_run", "max_rule_firings": 50}}"#
        )
        .unwrap();

        let config = RunnerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.suite_name, "pricing");
        assert_eq!(config.session_isolation, SessionIsolation::PerRun);
        assert_eq!(config.max_rule_firings, 50);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            RunnerConfig::from_str(r#"{"max_rule_firings": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunnerConfig::from_str(r#"{"suite_name": "  "}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunnerConfig::from_str("{"),
            Err(ConfigError::Json(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RunnerConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
