//! Sprout Metrics
//!
//! Application startup instrumentation.
//!
//! # Overview
//!
//! - **ApplicationStartup**: factory for named, timed, taggable steps
//! - **DefaultApplicationStartup**: no-op variant, zero overhead
//! - **FlightRecorderApplicationStartup**: tracks step nesting and commits
//!   one event per completed step to a [`FlightRecorder`]
//!
//! # Example
//!
//! ```rust
//! use sprout_metrics::{ApplicationStartup, FlightRecorderApplicationStartup, MemoryRecorder};
//! use std::sync::Arc;
//!
//! let events = Arc::new(MemoryRecorder::new());
//! let startup = FlightRecorderApplicationStartup::with_recorder(events.clone());
//!
//! let step = startup
//!     .start("spring.context.base-packages.scan")
//!     .tag_with("packages", || "[com.example]".to_string());
//! step.end();
//!
//! assert_eq!(events.events()[0].tags, "[packages=[com.example]]");
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod flight;
pub mod recorder;
pub mod report;
pub mod startup;
pub mod step;

// Re-exports
pub use config::{startup_for, startup_from_env, RecordingSettings, RECORDING_ENV};
pub use error::{ConfigError, RecordingError, StartupError};
pub use flight::{FlightRecorderApplicationStartup, FlightRecorderStartupStep, OpenSteps};
pub use recorder::{
    FanoutRecorder, FlightRecorder, InactiveRecorder, JsonLinesRecorder, MemoryRecorder,
    StepEvent, TracingRecorder, STEP_EVENT_NAME,
};
pub use report::{read_recording, StepNode, StepTree, MAX_STEP_DEPTH};
pub use startup::{validate_step_name, ApplicationStartup, DefaultApplicationStartup};
pub use step::{NoopStep, StartupStep, Step, Tag, TagValue, Tags, ROOT_STEP_ID};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for instrumenting startup phases
    pub use crate::{
        ApplicationStartup, DefaultApplicationStartup, FlightRecorderApplicationStartup,
        StartupStep,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
