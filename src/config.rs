//! Application-level configuration loading, including the question sequence.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::questions::Question;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/quiz.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_CONFIG_PATH";

/// Admission limit for one kind of action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    /// Attempts admitted per window.
    pub limit: usize,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-action rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimits {
    #[serde(default = "default_create_room_limit")]
    pub create_room: RateLimitConfig,
    #[serde(default = "default_join_room_limit")]
    pub join_room: RateLimitConfig,
    #[serde(default = "default_submit_answer_limit")]
    pub submit_answer: RateLimitConfig,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            create_room: default_create_room_limit(),
            join_room: default_join_room_limit(),
            submit_answer: default_submit_answer_limit(),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How long a host may stay disconnected before its room is closed.
    pub host_offline_ttl: Duration,
    pub max_players_per_room: usize,
    pub rate_limits: RateLimits,
    pub watchdog_interval: Duration,
    pub cleanup_interval: Duration,
    /// Attempts at drawing a free pin before giving up.
    pub pin_attempts: usize,
    pub questions: Vec<Question>,
}

/// Reasons a configuration file is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one question is required")]
    NoQuestions,
    #[error("question {index} needs at least two options")]
    TooFewOptions { index: usize },
    #[error("question {index} has correct_index {correct} out of range")]
    CorrectIndexOutOfRange { index: usize, correct: usize },
    #[error("question {index} must last at least one second")]
    ZeroDuration { index: usize },
    #[error("`{0}` must be at least 1")]
    NonPositive(&'static str),
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        questions = config.questions.len(),
                        "loaded quiz configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to load config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        let config = Self::from(raw);
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the room logic relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.questions.is_empty() {
            return Err(ConfigError::NoQuestions);
        }
        for (index, question) in self.questions.iter().enumerate() {
            if question.options.len() < 2 {
                return Err(ConfigError::TooFewOptions { index });
            }
            if question.correct_index >= question.options.len() {
                return Err(ConfigError::CorrectIndexOutOfRange {
                    index,
                    correct: question.correct_index,
                });
            }
            if question.duration < Duration::from_secs(1) {
                return Err(ConfigError::ZeroDuration { index });
            }
        }

        let limits = [
            ("rate_limits.create_room.limit", self.rate_limits.create_room.limit),
            ("rate_limits.join_room.limit", self.rate_limits.join_room.limit),
            ("rate_limits.submit_answer.limit", self.rate_limits.submit_answer.limit),
            ("max_players_per_room", self.max_players_per_room),
            ("pin_attempts", self.pin_attempts),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::NonPositive(name));
        }
        if self.watchdog_interval.is_zero() {
            return Err(ConfigError::NonPositive("watchdog_interval_secs"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::NonPositive("cleanup_interval_secs"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default = "default_host_offline_ttl_secs")]
    host_offline_ttl_secs: u64,
    #[serde(default = "default_max_players_per_room")]
    max_players_per_room: usize,
    #[serde(default)]
    rate_limits: RateLimits,
    #[serde(default = "default_watchdog_interval_secs")]
    watchdog_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    cleanup_interval_secs: u64,
    #[serde(default = "default_pin_attempts")]
    pin_attempts: usize,
    #[serde(default = "default_questions")]
    questions: Vec<RawQuestion>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            host_offline_ttl_secs: default_host_offline_ttl_secs(),
            max_players_per_room: default_max_players_per_room(),
            rate_limits: RateLimits::default(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            pin_attempts: default_pin_attempts(),
            questions: default_questions(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            host_offline_ttl: Duration::from_secs(value.host_offline_ttl_secs),
            max_players_per_room: value.max_players_per_room,
            rate_limits: value.rate_limits,
            watchdog_interval: Duration::from_secs(value.watchdog_interval_secs),
            cleanup_interval: Duration::from_secs(value.cleanup_interval_secs),
            pin_attempts: value.pin_attempts,
            questions: value.questions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single question inside the configuration file.
struct RawQuestion {
    text: String,
    options: Vec<String>,
    correct_index: usize,
    duration_secs: u64,
}

impl From<RawQuestion> for Question {
    fn from(value: RawQuestion) -> Self {
        Self {
            text: value.text,
            options: value.options,
            correct_index: value.correct_index,
            duration: Duration::from_secs(value.duration_secs),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn default_host_offline_ttl_secs() -> u64 {
    10 * 60
}

fn default_max_players_per_room() -> usize {
    50
}

fn default_watchdog_interval_secs() -> u64 {
    2
}

fn default_cleanup_interval_secs() -> u64 {
    30
}

fn default_pin_attempts() -> usize {
    20
}

fn default_create_room_limit() -> RateLimitConfig {
    RateLimitConfig {
        limit: 3,
        window_secs: 60,
    }
}

fn default_join_room_limit() -> RateLimitConfig {
    RateLimitConfig {
        limit: 5,
        window_secs: 10,
    }
}

fn default_submit_answer_limit() -> RateLimitConfig {
    RateLimitConfig {
        limit: 3,
        window_secs: 3,
    }
}

/// Built-in question sequence shipped with the binary.
fn default_questions() -> Vec<RawQuestion> {
    vec![
        RawQuestion {
            text: "What is 2 + 2?".into(),
            options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
            correct_index: 1,
            duration_secs: 15,
        },
        RawQuestion {
            text: "What is the capital of Ukraine?".into(),
            options: vec![
                "Lviv".into(),
                "Kharkiv".into(),
                "Kyiv".into(),
                "Odesa".into(),
            ],
            correct_index: 2,
            duration_secs: 15,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.questions.len(), 2);
        assert_eq!(config.host_offline_ttl, Duration::from_secs(600));
        assert_eq!(config.rate_limits.join_room.limit, 5);
    }

    #[test]
    fn partial_files_keep_defaults_for_missing_fields() {
        let config = AppConfig::from_json(
            r#"{
                "max_players_per_room": 4,
                "rate_limits": { "submit_answer": { "limit": 1, "window_secs": 5 } },
                "questions": [
                    { "text": "Pick b", "options": ["a", "b"], "correct_index": 1, "duration_secs": 10 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_players_per_room, 4);
        assert_eq!(config.rate_limits.submit_answer.window(), Duration::from_secs(5));
        assert_eq!(config.rate_limits.create_room.limit, 3);
        assert_eq!(config.questions[0].duration, Duration::from_secs(10));
        assert_eq!(config.watchdog_interval, Duration::from_secs(2));
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        let err = AppConfig::from_json(
            r#"{ "questions": [
                { "text": "q", "options": ["a", "b"], "correct_index": 2, "duration_secs": 10 }
            ] }"#,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::CorrectIndexOutOfRange {
                index: 0,
                correct: 2
            })
        );
    }

    #[test]
    fn rejects_empty_question_list_and_zero_limits() {
        let err = AppConfig::from_json(r#"{ "questions": [] }"#).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::NoQuestions));

        let err = AppConfig::from_json(r#"{ "pin_attempts": 0 }"#).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::NonPositive("pin_attempts"))
        );
    }
}
