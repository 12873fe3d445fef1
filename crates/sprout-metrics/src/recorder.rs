//! Flight-recording backends
//!
//! A [`FlightRecorder`] persists one [`StepEvent`] per completed step.
//! Whether recording is active is decided outside the instrumented
//! application (a launch-time setting), so every backend must be cheap to
//! query and must never make the caller fail.

use crate::config::RecordingSettings;
use crate::error::RecordingError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Event name identifying a step-completion record
pub const STEP_EVENT_NAME: &str = "sprout.core.StartupStep";

/// Tracing target used by [`TracingRecorder`]
pub const TRACING_TARGET: &str = "sprout::startup";

/// Record committed for every completed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Always [`STEP_EVENT_NAME`]
    pub event_name: String,
    /// Sequence id of the step
    pub sequence_id: u64,
    /// Sequence id of the enclosing step (`0` for top-level steps)
    pub parent_sequence_id: u64,
    /// Step name
    pub name: String,
    /// Flattened `[key=value, ...]` tag rendering
    pub tags: String,
    /// Wall-clock start of the step
    pub start_time: DateTime<Utc>,
    /// Elapsed time in microseconds
    pub duration_us: u64,
}

impl StepEvent {
    /// Elapsed time of the step
    #[inline]
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.duration_us)
    }

    /// Check if the step was started with no enclosing step
    #[inline]
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_sequence_id == crate::step::ROOT_STEP_ID
    }
}

/// Backend receiving completed steps
pub trait FlightRecorder: Send + Sync + Debug {
    /// Whether events are currently being persisted
    fn is_recording(&self) -> bool;

    /// Persist a completed step
    ///
    /// # Errors
    /// Backend-specific I/O or encoding failures. Callers log and drop them.
    fn commit(&self, event: &StepEvent) -> Result<(), RecordingError>;
}

/// Backend with no recording attached
#[derive(Debug, Clone, Copy, Default)]
pub struct InactiveRecorder;

impl FlightRecorder for InactiveRecorder {
    fn is_recording(&self) -> bool {
        false
    }

    fn commit(&self, _event: &StepEvent) -> Result<(), RecordingError> {
        Ok(())
    }
}

/// Backend capturing events in memory
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<StepEvent>>,
}

impl MemoryRecorder {
    /// Create an empty recorder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of committed events, in commit order
    #[must_use]
    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().clone()
    }

    /// Number of committed events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if nothing was committed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// First committed event with the given step name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<StepEvent> {
        self.events.lock().iter().find(|e| e.name == name).cloned()
    }

    /// Committed event for a sequence id
    #[must_use]
    pub fn by_id(&self, sequence_id: u64) -> Option<StepEvent> {
        self.events
            .lock()
            .iter()
            .find(|e| e.sequence_id == sequence_id)
            .cloned()
    }

    /// Drop all captured events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl FlightRecorder for MemoryRecorder {
    fn is_recording(&self) -> bool {
        true
    }

    fn commit(&self, event: &StepEvent) -> Result<(), RecordingError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Backend appending one JSON object per line to a file
///
/// Recording stops once the configured duration has elapsed since the
/// recorder was created.
#[derive(Debug)]
pub struct JsonLinesRecorder {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    started: Instant,
    window: Option<Duration>,
}

impl JsonLinesRecorder {
    /// Create (truncate) the recording file described by `settings`
    ///
    /// # Errors
    /// - [`RecordingError::Io`] if the file cannot be created
    pub fn create(settings: &RecordingSettings) -> Result<Self, RecordingError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&settings.filename)?;
        tracing::info!(
            path = %settings.filename.display(),
            window = ?settings.duration,
            "startup recording started"
        );
        Ok(Self {
            path: settings.filename.clone(),
            writer: Mutex::new(BufWriter::new(file)),
            started: Instant::now(),
            window: settings.duration,
        })
    }

    /// Recording file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered events to disk
    ///
    /// # Errors
    /// - [`RecordingError::Io`] if the flush fails
    pub fn flush(&self) -> Result<(), RecordingError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

impl FlightRecorder for JsonLinesRecorder {
    fn is_recording(&self) -> bool {
        self.window
            .map_or(true, |window| self.started.elapsed() < window)
    }

    fn commit(&self, event: &StepEvent) -> Result<(), RecordingError> {
        if !self.is_recording() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Backend emitting each step as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl FlightRecorder for TracingRecorder {
    fn is_recording(&self) -> bool {
        tracing::enabled!(target: TRACING_TARGET, tracing::Level::INFO)
    }

    fn commit(&self, event: &StepEvent) -> Result<(), RecordingError> {
        tracing::info!(
            target: TRACING_TARGET,
            sequence_id = event.sequence_id,
            parent_sequence_id = event.parent_sequence_id,
            tags = %event.tags,
            duration_us = event.duration_us,
            "{}",
            event.name
        );
        Ok(())
    }
}

/// Backend forwarding to several recorders
///
/// Records while any child records. A failing child does not stop the
/// others; the first error is returned.
#[derive(Debug, Default)]
pub struct FanoutRecorder {
    recorders: Vec<Arc<dyn FlightRecorder>>,
}

impl FanoutRecorder {
    /// Create with no children
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child recorder
    #[must_use]
    pub fn with(mut self, recorder: Arc<dyn FlightRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }
}

impl FlightRecorder for FanoutRecorder {
    fn is_recording(&self) -> bool {
        self.recorders.iter().any(|r| r.is_recording())
    }

    fn commit(&self, event: &StepEvent) -> Result<(), RecordingError> {
        let mut first_error = None;
        for recorder in self.recorders.iter().filter(|r| r.is_recording()) {
            if let Err(err) = recorder.commit(event) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
