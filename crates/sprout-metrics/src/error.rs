//! Error types for startup instrumentation
//!
//! Instrumentation never fails the caller's real work. These errors only
//! surface from the fallible entry points:
//! - Step name validation (`try_start`)
//! - Recording backend construction and commits
//! - Recording configuration parsing

use std::io;
use std::path::PathBuf;

/// Errors raised while starting steps or selecting a recorder
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Step name is empty
    #[error("step name must not be empty")]
    EmptyName,

    /// Step name violates the dotted-namespace convention
    #[error("invalid step name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Recording configuration is invalid
    #[error("recording configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Recording backend could not be created
    #[error("recording backend error: {0}")]
    Recording(#[from] RecordingError),
}

impl StartupError {
    /// Check if the error is a caller programming error (bad step name)
    #[inline]
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::EmptyName | Self::InvalidName { .. })
    }
}

/// Errors raised by flight-recording backends
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    /// Underlying I/O failed
    #[error("recording i/o failed: {0}")]
    Io(#[from] io::Error),

    /// Event could not be encoded
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A recording file contains a line that is not a step event
    #[error("{path}:{line}: malformed step event: {source}")]
    MalformedLine {
        /// Recording file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Decoding failure
        #[source]
        source: serde_json::Error,
    },
}

impl RecordingError {
    /// Check if the failure came from the filesystem
    #[inline]
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Recording configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No `filename=` entry was given
    #[error("recording settings require a filename")]
    MissingFilename,

    /// Entry is not `key=value`
    #[error("malformed recording setting: {0:?}")]
    MalformedEntry(String),

    /// Entry key is not recognised
    #[error("unknown recording setting: {0:?}")]
    UnknownKey(String),

    /// Duration value cannot be parsed
    #[error("invalid recording duration: {0:?}")]
    InvalidDuration(String),

    /// Environment variable holds non UTF-8 data
    #[error("environment variable {0} is not valid unicode")]
    NotUnicode(&'static str),
}
