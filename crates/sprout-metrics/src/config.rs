//! Recording configuration
//!
//! Recording is switched on at launch time, outside the application code,
//! with a settings string such as `filename=recording.jsonl,duration=10s`
//! passed through the [`RECORDING_ENV`] environment variable.

use crate::error::{ConfigError, StartupError};
use crate::flight::FlightRecorderApplicationStartup;
use crate::recorder::JsonLinesRecorder;
use crate::startup::{ApplicationStartup, DefaultApplicationStartup};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the recording settings
pub const RECORDING_ENV: &str = "SPROUT_STARTUP_RECORDING";

/// Where and for how long startup steps are recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSettings {
    /// Output file (JSON lines)
    pub filename: PathBuf,
    /// Recording window; `None` records until shutdown
    pub duration: Option<Duration>,
}

impl RecordingSettings {
    /// Record to `filename` with no time limit
    #[inline]
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            duration: None,
        }
    }

    /// With a recording window
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Read settings from [`RECORDING_ENV`]
    ///
    /// Returns `Ok(None)` when the variable is unset or blank.
    ///
    /// # Errors
    /// - [`ConfigError`] if the variable is set but malformed
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match std::env::var(RECORDING_ENV) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => value.parse().map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(RECORDING_ENV)),
        }
    }
}

impl FromStr for RecordingSettings {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filename = None;
        let mut duration = None;

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedEntry(entry.to_string()))?;
            match key.trim() {
                "filename" if !value.trim().is_empty() => {
                    filename = Some(PathBuf::from(value.trim()));
                }
                "filename" => return Err(ConfigError::MissingFilename),
                "duration" => duration = parse_duration(value.trim())?,
                other => return Err(ConfigError::UnknownKey(other.to_string())),
            }
        }

        Ok(Self {
            filename: filename.ok_or(ConfigError::MissingFilename)?,
            duration,
        })
    }
}

/// Parse `500ms`, `10s`, `2m`, `1h` or bare seconds
///
/// A zero duration means "no limit".
fn parse_duration(value: &str) -> Result<Option<Duration>, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(value.to_string());
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(amount.checked_mul(3_600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok((!duration.is_zero()).then_some(duration))
}

/// Pick the startup recorder for this process
///
/// A flight recorder writing to the configured file when
/// [`RECORDING_ENV`] is set, the no-op default otherwise.
///
/// # Errors
/// - [`StartupError::Config`] if the settings are malformed
/// - [`StartupError::Recording`] if the recording file cannot be created
pub fn startup_from_env() -> Result<Arc<dyn ApplicationStartup>, StartupError> {
    match RecordingSettings::from_env()? {
        Some(settings) => startup_for(&settings),
        None => Ok(DefaultApplicationStartup::shared()),
    }
}

/// Flight recorder writing to the file described by `settings`
///
/// # Errors
/// - [`StartupError::Recording`] if the recording file cannot be created
pub fn startup_for(settings: &RecordingSettings) -> Result<Arc<dyn ApplicationStartup>, StartupError> {
    let recorder = JsonLinesRecorder::create(settings)?;
    Ok(Arc::new(FlightRecorderApplicationStartup::with_recorder(
        Arc::new(recorder),
    )))
}
