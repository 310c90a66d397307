//! Pipeline configuration.
//!
//! Durations are plain `f64` seconds so a configuration file stays readable;
//! accessors convert them to [`Duration`] after [`PipelineConfig::validate`]
//! has checked them.

use crate::capability::{BackoffStrategy, JitterStrategy, RetryPolicy};
use crate::errors::ConfigError;
use crate::pipeline::FailureMode;
use crate::poller::{PollBudget, DEFAULT_MAX_CONCURRENCY, DEFAULT_TRANSPORT_RETRIES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration of the video pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name used in logs and events.
    #[serde(default = "default_name")]
    pub name: String,
    /// How stage failures are handled.
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Cancels a run that takes longer than this many seconds.
    #[serde(default)]
    pub run_deadline_seconds: Option<f64>,
    /// Budget of the image job stage.
    #[serde(default)]
    pub images: JobStageConfig,
    /// Retries for one-shot generation calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Output video settings.
    #[serde(default)]
    pub video: VideoConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_name() -> String {
    "VideoGenerationPipeline".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            failure_mode: FailureMode::default(),
            run_deadline_seconds: None,
            images: JobStageConfig::default(),
            retry: RetryConfig::default(),
            video: VideoConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`PipelineConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the run deadline.
    #[must_use]
    pub fn with_run_deadline_seconds(mut self, seconds: f64) -> Self {
        self.run_deadline_seconds = Some(seconds);
        self
    }

    /// Sets the image job stage configuration.
    #[must_use]
    pub fn with_images(mut self, images: JobStageConfig) -> Self {
        self.images = images;
        self
    }

    /// Sets the number of images per video.
    #[must_use]
    pub fn with_image_count(mut self, count: usize) -> Self {
        self.video.image_count = count;
        self
    }

    /// Returns the run deadline, if one is set and valid.
    #[must_use]
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if let Some(seconds) = self.run_deadline_seconds {
            positive_duration("run_deadline_seconds", seconds)?;
        }
        self.images.budget()?;
        self.retry.policy()?;
        self.video.validate()
    }
}

/// Budget and re-submission settings for a job stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStageConfig {
    /// Seconds between polls of one job.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: f64,
    /// Seconds before unfinished jobs time out.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Consecutive transport errors tolerated per job.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
    /// Jobs polled at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Extra rounds for ordinals that failed.
    #[serde(default)]
    pub resubmit_rounds: u32,
}

fn default_poll_interval() -> f64 {
    5.0
}

fn default_timeout() -> f64 {
    300.0
}

fn default_transport_retries() -> u32 {
    DEFAULT_TRANSPORT_RETRIES
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for JobStageConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            timeout_seconds: default_timeout(),
            transport_retries: default_transport_retries(),
            max_concurrency: default_max_concurrency(),
            resubmit_rounds: 0,
        }
    }
}

impl JobStageConfig {
    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, seconds: f64) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    /// Sets the total timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the re-submission rounds.
    #[must_use]
    pub fn with_resubmit_rounds(mut self, rounds: u32) -> Self {
        self.resubmit_rounds = rounds;
        self
    }

    /// Converts the settings to a poll budget.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for non-positive or non-finite seconds,
    /// a zero concurrency, or an interval longer than the timeout.
    pub fn budget(&self) -> Result<PollBudget, ConfigError> {
        let total_wait = positive_duration("timeout_seconds", self.timeout_seconds)?;
        let poll_interval = positive_duration("poll_interval_seconds", self.poll_interval_seconds)?;
        if poll_interval > total_wait {
            return Err(ConfigError::Invalid(
                "poll_interval_seconds must not exceed timeout_seconds".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".to_string()));
        }
        Ok(PollBudget::new(total_wait, poll_interval)
            .with_transport_retries(self.transport_retries)
            .with_max_concurrency(self.max_concurrency))
    }
}

/// Retry settings for generation capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial delay between attempts in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: f64,
    /// Maximum delay between attempts in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    30.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_seconds: default_retry_delay(),
            max_delay_seconds: default_max_delay(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Converts the settings to a retry policy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for zero attempts or bad delays.
    pub fn policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        Ok(RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(positive_duration("retry_delay_seconds", self.retry_delay_seconds)?)
            .with_max_delay(positive_duration("max_delay_seconds", self.max_delay_seconds)?)
            .with_backoff(self.backoff)
            .with_jitter(self.jitter))
    }
}

/// Output video settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Images generated per video.
    #[serde(default = "default_image_count")]
    pub image_count: usize,
    /// Longest script, in characters.
    #[serde(default = "default_max_script_length")]
    pub max_script_length: usize,
    /// Frame width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Frame height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Frames per second.
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_image_count() -> usize {
    4
}

fn default_max_script_length() -> usize {
    500
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    576
}

fn default_fps() -> u32 {
    24
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            image_count: default_image_count(),
            max_script_length: default_max_script_length(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.image_count == 0 {
            return Err(ConfigError::Invalid("image_count must be at least 1".to_string()));
        }
        if self.max_script_length == 0 {
            return Err(ConfigError::Invalid("max_script_length must be at least 1".to_string()));
        }
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(ConfigError::Invalid(
                "width, height and fps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn positive_duration(field: &str, seconds: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be a positive number of seconds, got {seconds}"
        ))),
    }
}
