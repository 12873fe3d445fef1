//! Flight-recording [`ApplicationStartup`]
//!
//! Each step gets a sequence id from a process-wide atomic counter. The
//! ids of steps that are still running sit on a shared [`OpenSteps`]
//! stack, most recent first, which is how a new step finds its parent.
//! Completed steps are committed as [`StepEvent`]s to a [`FlightRecorder`];
//! recording backends only carry primitive fields, so tags are flattened
//! into a single string attribute.

use crate::error::StartupError;
use crate::recorder::{FlightRecorder, InactiveRecorder, StepEvent, STEP_EVENT_NAME};
use crate::startup::{validate_step_name, ApplicationStartup};
use crate::step::{StartupStep, Step, Tag, Tags, ROOT_STEP_ID};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Ids of currently running steps, most recent first
///
/// Always holds the root sentinel [`ROOT_STEP_ID`] at the bottom.
#[derive(Debug)]
pub struct OpenSteps {
    ids: Mutex<VecDeque<u64>>,
}

impl OpenSteps {
    /// Create a stack holding only the root sentinel
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: Mutex::new(VecDeque::from([ROOT_STEP_ID])),
        }
    }

    /// Push `id` and return the head it was pushed onto
    ///
    /// The parent read and the push happen under one lock, so the returned
    /// parent is never `id` itself and never a step that ended in between.
    pub fn push(&self, id: u64) -> u64 {
        let mut ids = self.ids.lock();
        let parent = ids.front().copied().unwrap_or(ROOT_STEP_ID);
        ids.push_front(id);
        parent
    }

    /// Remove the most recently pushed occurrence of `id`
    ///
    /// Returns `false` when `id` is not open. The root sentinel is never
    /// removed.
    pub fn remove(&self, id: u64) -> bool {
        if id == ROOT_STEP_ID {
            return false;
        }
        let mut ids = self.ids.lock();
        match ids.iter().position(|&open| open == id) {
            Some(index) => {
                ids.remove(index);
                true
            }
            None => false,
        }
    }

    /// Innermost open id (the root sentinel when nothing is open)
    #[must_use]
    pub fn head(&self) -> u64 {
        self.ids.lock().front().copied().unwrap_or(ROOT_STEP_ID)
    }

    /// Open ids, most recent first, including the root sentinel
    #[must_use]
    pub fn snapshot(&self) -> Vec<u64> {
        self.ids.lock().iter().copied().collect()
    }

    /// Number of open steps, excluding the root sentinel
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ids.lock().len().saturating_sub(1)
    }
}

impl Default for OpenSteps {
    fn default() -> Self {
        Self::new()
    }
}

/// [`ApplicationStartup`] committing steps to a [`FlightRecorder`]
///
/// ```rust
/// use sprout_metrics::{ApplicationStartup, FlightRecorderApplicationStartup, MemoryRecorder};
/// use std::sync::Arc;
///
/// let events = Arc::new(MemoryRecorder::new());
/// let startup = FlightRecorderApplicationStartup::with_recorder(events.clone());
///
/// let init = startup.start("app.init");
/// startup.start("app.init.beans").end();
/// init.tag("count", "42").end();
///
/// let init = events.find("app.init").unwrap();
/// assert_eq!(init.tags, "[count=42]");
/// assert_eq!(events.find("app.init.beans").unwrap().parent_sequence_id, init.sequence_id);
/// ```
#[derive(Debug)]
pub struct FlightRecorderApplicationStartup {
    current_sequence_id: AtomicU64,
    open_steps: Arc<OpenSteps>,
    recorder: Arc<dyn FlightRecorder>,
}

impl FlightRecorderApplicationStartup {
    /// Create with no recording attached
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_recorder(Arc::new(InactiveRecorder))
    }

    /// Create committing to `recorder`
    #[must_use]
    pub fn with_recorder(recorder: Arc<dyn FlightRecorder>) -> Self {
        Self {
            current_sequence_id: AtomicU64::new(ROOT_STEP_ID),
            open_steps: Arc::new(OpenSteps::new()),
            recorder,
        }
    }

    /// Recording backend
    #[inline]
    #[must_use]
    pub fn recorder(&self) -> &Arc<dyn FlightRecorder> {
        &self.recorder
    }

    /// Currently open steps
    #[inline]
    #[must_use]
    pub fn open_steps(&self) -> &OpenSteps {
        &self.open_steps
    }

    /// Last sequence id handed out
    #[inline]
    #[must_use]
    pub fn current_sequence_id(&self) -> u64 {
        self.current_sequence_id.load(Ordering::Acquire)
    }

    /// Start a step, returning the concrete handle
    ///
    /// # Errors
    /// - [`StartupError`] when `name` is not a valid step name
    pub fn start_step(&self, name: &str) -> Result<FlightRecorderStartupStep, StartupError> {
        validate_step_name(name)?;
        let sequence_id = self.current_sequence_id.fetch_add(1, Ordering::AcqRel) + 1;
        let parent_id = self.open_steps.push(sequence_id);
        Ok(FlightRecorderStartupStep {
            sequence_id,
            parent_id,
            name: name.to_string(),
            tags: Tags::new(),
            start_time: Utc::now(),
            started: Instant::now(),
            ended: false,
            open_steps: Arc::clone(&self.open_steps),
            recorder: Arc::clone(&self.recorder),
        })
    }
}

impl Default for FlightRecorderApplicationStartup {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationStartup for FlightRecorderApplicationStartup {
    fn try_start(&self, name: &str) -> Result<StartupStep, StartupError> {
        let step = self.start_step(name)?;
        Ok(StartupStep::new(Box::new(step)))
    }
}

/// Step committed as a [`StepEvent`] when it ends
///
/// `end` is idempotent: only the first call removes the id from the open
/// stack and commits an event. Tags attached after `end` are ignored.
#[derive(Debug)]
pub struct FlightRecorderStartupStep {
    sequence_id: u64,
    parent_id: u64,
    name: String,
    tags: Tags,
    start_time: DateTime<Utc>,
    started: Instant,
    ended: bool,
    open_steps: Arc<OpenSteps>,
    recorder: Arc<dyn FlightRecorder>,
}

impl FlightRecorderStartupStep {
    /// Parent sequence id, [`ROOT_STEP_ID`] for top-level steps
    #[inline]
    #[must_use]
    pub fn parent_sequence_id(&self) -> u64 {
        self.parent_id
    }

    /// Check if the step has been ended
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn commit(&mut self) {
        let duration_us = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.tags.resolve();
        let event = StepEvent {
            event_name: STEP_EVENT_NAME.to_string(),
            sequence_id: self.sequence_id,
            parent_sequence_id: self.parent_id,
            name: self.name.clone(),
            tags: self.tags.to_string(),
            start_time: self.start_time,
            duration_us,
        };
        match catch_unwind(AssertUnwindSafe(|| self.recorder.commit(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(
                step = %self.name,
                sequence_id = self.sequence_id,
                error = %err,
                "dropping startup step event"
            ),
            Err(_) => tracing::warn!(
                step = %self.name,
                sequence_id = self.sequence_id,
                "recording backend panicked; dropping startup step event"
            ),
        }
    }

    fn is_recording(&self) -> bool {
        catch_unwind(AssertUnwindSafe(|| self.recorder.is_recording())).unwrap_or_else(|_| {
            tracing::warn!(step = %self.name, "recording backend panicked; treating it as inactive");
            false
        })
    }
}

impl Step for FlightRecorderStartupStep {
    fn id(&self) -> u64 {
        self.sequence_id
    }

    fn parent_id(&self) -> Option<u64> {
        (self.parent_id != ROOT_STEP_ID).then_some(self.parent_id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn records_tags(&self) -> bool {
        !self.ended && self.is_recording()
    }

    fn add_tag(&mut self, tag: Tag) {
        if self.ended {
            tracing::debug!(step = %self.name, key = tag.key(), "ignoring tag on ended step");
            return;
        }
        self.tags.push(tag);
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.open_steps.remove(self.sequence_id);
        if self.is_recording() {
            self.commit();
        }
    }
}

impl Drop for FlightRecorderStartupStep {
    fn drop(&mut self) {
        self.end();
    }
}
