use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            search: SearchConfig::default(),
            playback: PlaybackConfig::default(),
            bus: BusConfig::default(),
            logging: LoggingConfig::default(),
            providers: Vec::new(),
        }
    }
}

/// Timing and filtering policy for a search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Initial per-phrase deadline; replies arriving later end the session.
    #[serde(default = "default_min_timeout")]
    pub min_timeout_secs: f64,
    /// Absolute ceiling regardless of extensions.
    #[serde(default = "default_max_timeout")]
    pub max_timeout_secs: f64,
    /// Added to the ceiling for unconstrained (generic) queries.
    #[serde(default = "default_generic_bonus")]
    pub generic_bonus_secs: f64,
    #[serde(default = "default_early_stop_thresh")]
    pub early_stop_thresh: u32,
    /// Delay before an early stop takes effect, so close competitors still land.
    #[serde(default = "default_early_stop_grace")]
    pub early_stop_grace_secs: f64,
    #[serde(default = "default_true")]
    pub allow_extensions: bool,
    /// Retry as a generic query when a typed query finds nothing.
    #[serde(default = "default_true")]
    pub search_fallback: bool,
    /// Also query providers speaking the legacy dialect.
    #[serde(default = "default_true")]
    pub backwards_compatibility: bool,
    /// Minimum confidence for a result to show up in the progress footer.
    #[serde(default = "default_progress_threshold")]
    pub progress_threshold: u32,
    /// Confidence removed from results forced to audio for lack of a display.
    #[serde(default = "default_audio_cast_penalty")]
    pub audio_cast_penalty: u32,
    /// Wait after the last active provider finished before ending the session.
    #[serde(default = "default_settle")]
    pub settle_secs: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_timeout_secs: default_min_timeout(),
            max_timeout_secs: default_max_timeout(),
            generic_bonus_secs: default_generic_bonus(),
            early_stop_thresh: default_early_stop_thresh(),
            early_stop_grace_secs: default_early_stop_grace(),
            allow_extensions: true,
            search_fallback: true,
            backwards_compatibility: true,
            progress_threshold: default_progress_threshold(),
            audio_cast_penalty: default_audio_cast_penalty(),
            settle_secs: default_settle(),
        }
    }
}

impl SearchConfig {
    pub fn min_timeout(&self) -> Duration {
        secs(self.min_timeout_secs)
    }

    pub fn max_timeout(&self) -> Duration {
        secs(self.max_timeout_secs)
    }

    pub fn generic_bonus(&self) -> Duration {
        secs(self.generic_bonus_secs)
    }

    pub fn early_stop_grace(&self) -> Duration {
        secs(self.early_stop_grace_secs)
    }

    pub fn settle(&self) -> Duration {
        secs(self.settle_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("search.min_timeout_secs", self.min_timeout_secs),
            ("search.max_timeout_secs", self.max_timeout_secs),
            ("search.generic_bonus_secs", self.generic_bonus_secs),
            ("search.early_stop_grace_secs", self.early_stop_grace_secs),
            ("search.settle_secs", self.settle_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidDuration { field, value });
            }
        }
        if self.min_timeout_secs > self.max_timeout_secs {
            return Err(ValidationError::TimeoutOrder {
                min: self.min_timeout_secs,
                max: self.max_timeout_secs,
            });
        }
        for (field, value) in [
            ("search.early_stop_thresh", self.early_stop_thresh),
            ("search.progress_threshold", self.progress_threshold),
            ("search.audio_cast_penalty", self.audio_cast_penalty),
        ] {
            if value > 100 {
                return Err(ValidationError::ScoreOutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// How selected media may be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Play each entry the best way available.
    #[default]
    Auto,
    /// Only consider audio entries.
    AudioOnly,
    /// Only consider video entries.
    VideoOnly,
    /// Cast video to audio unconditionally.
    ForceAudio,
    /// Route everything to the audio service backend.
    ForceAudioService,
    /// Emit playback events only, play nothing.
    EventsOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub playback_mode: PlaybackMode,
    /// Results below this confidence never reach selection.
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    /// Phrases that mean "resume" while paused.
    #[serde(default = "default_resume_phrases")]
    pub resume_phrases: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playback_mode: PlaybackMode::default(),
            min_score: default_min_score(),
            resume_phrases: default_resume_phrases(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

/// A catalog-backed provider to start alongside the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub catalog: PathBuf,
    #[serde(default)]
    pub reply_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_stdout_enabled")]
    pub stdout: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stdout: default_stdout_enabled(),
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("{field} must be a non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
    #[error("search.min_timeout_secs ({min}) exceeds search.max_timeout_secs ({max})")]
    TimeoutOrder { min: f64, max: f64 },
    #[error("{field} must be within 0..=100, got {value}")]
    ScoreOutOfRange { field: &'static str, value: u32 },
    #[error("bus.capacity must be greater than zero")]
    ZeroBusCapacity,
    #[error("provider id must not be empty")]
    EmptyProviderId,
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }
        self.search.validate()?;
        if self.playback.min_score > 100 {
            return Err(ValidationError::ScoreOutOfRange {
                field: "playback.min_score",
                value: self.playback.min_score,
            });
        }
        if self.bus.capacity == 0 {
            return Err(ValidationError::ZeroBusCapacity);
        }
        if self.providers.iter().any(|p| p.id.trim().is_empty()) {
            return Err(ValidationError::EmptyProviderId);
        }
        Ok(())
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_true() -> bool {
    true
}

fn default_min_timeout() -> f64 {
    1.0
}

fn default_max_timeout() -> f64 {
    5.0
}

fn default_generic_bonus() -> f64 {
    3.0
}

fn default_early_stop_thresh() -> u32 {
    90
}

fn default_early_stop_grace() -> f64 {
    1.0
}

fn default_progress_threshold() -> u32 {
    30
}

fn default_audio_cast_penalty() -> u32 {
    10
}

fn default_settle() -> f64 {
    0.5
}

fn default_min_score() -> u32 {
    50
}

fn default_resume_phrases() -> Vec<String> {
    ["resume", "play", "continue"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_stdout_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.max_log_files, 7);
        assert_eq!(config.search.min_timeout(), Duration::from_secs(1));
        assert_eq!(config.search.max_timeout(), Duration::from_secs(5));
        assert_eq!(config.search.generic_bonus(), Duration::from_secs(3));
        assert_eq!(config.search.early_stop_thresh, 90);
        assert_eq!(config.search.early_stop_grace(), Duration::from_secs(1));
        assert_eq!(config.playback.min_score, 50);
        assert_eq!(config.playback.playback_mode, PlaybackMode::Auto);
    }

    #[test]
    fn invalid_version_rejected() {
        let mut config = Config::default();
        config.config_version = CURRENT_CONFIG_VERSION + 1;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [search]
            max_timeout_secs = 8.0
            early_stop_thresh = 80

            [playback]
            playback_mode = "video_only"

            [[providers]]
            id = "radio"
            catalog = "/srv/catalogs/radio.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.search.max_timeout_secs, 8.0);
        assert_eq!(config.search.min_timeout_secs, 1.0);
        assert_eq!(config.search.early_stop_thresh, 80);
        assert_eq!(config.playback.playback_mode, PlaybackMode::VideoOnly);
        assert_eq!(config.providers[0].reply_delay_ms, 0);
    }

    #[test]
    fn inverted_timeouts_rejected() {
        let mut config = Config::default();
        config.search.min_timeout_secs = 6.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::TimeoutOrder { .. })
        ));
    }

    #[test]
    fn negative_grace_rejected() {
        let mut config = Config::default();
        config.search.early_stop_grace_secs = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidDuration {
                field: "search.early_stop_grace_secs",
                ..
            })
        ));
    }

    #[test]
    fn threshold_above_hundred_rejected() {
        let mut config = Config::default();
        config.search.early_stop_thresh = 101;
        assert!(config.validate().is_err());
        config.search.early_stop_thresh = 90;
        config.bus.capacity = 0;
        assert_eq!(config.validate(), Err(ValidationError::ZeroBusCapacity));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = Config::from_toml("search = 3");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
