//! Sprout Context
//!
//! Application context contracts whose startup phases are instrumented
//! through [`sprout_metrics::ApplicationStartup`].
//!
//! # Overview
//!
//! - **GenericApplicationContext**: registry plus environment, refreshed once
//! - **AnnotationConfigApplicationContext**: registers component types and
//!   scans packages, recording each phase as a startup step
//! - **GenericWebApplicationContext**: servlet-aware variant with web scopes
//!
//! # Example
//!
//! ```rust
//! use sprout_context::prelude::*;
//! use sprout_metrics::{FlightRecorderApplicationStartup, MemoryRecorder};
//! use std::sync::Arc;
//!
//! let events = Arc::new(MemoryRecorder::new());
//! let mut ctx = AnnotationConfigApplicationContext::with_startup(Arc::new(
//!     FlightRecorderApplicationStartup::with_recorder(events.clone()),
//! ));
//! ctx.register(vec![ComponentClass::component("com.example.UserService")]).unwrap();
//! ctx.refresh().unwrap();
//!
//! assert!(ctx.registry().contains("userService"));
//! assert!(events.find("spring.context.refresh").is_some());
//! ```

#![warn(missing_docs)]

pub mod annotation;
pub mod condition;
pub mod context;
pub mod env;
pub mod error;
pub mod registry;
pub mod web;

// Re-exports
pub use annotation::{
    AnnotatedDefinitionReader, AnnotationConfigApplicationContext, AnnotationNameGenerator,
    CatalogEntry, CatalogScanner, ComponentScanner, EmptyScanner, FullyQualifiedNameGenerator,
    NameGenerator, PackageDefinitionScanner, NAME_GENERATOR_SINGLETON,
};
pub use condition::{
    Condition, ConditionContext, ConditionEvaluator, ConditionRef, ConfigurationCondition,
    ConfigurationPhase, OnComponentCondition, OnProfileCondition, OnPropertyCondition,
};
pub use context::{
    ApplicationContext, ContextState, GenericApplicationContext, NoRefreshHooks, RefreshHooks,
};
pub use env::{EnvironmentCapable, PropertySource, StandardEnvironment};
pub use error::ContextError;
pub use registry::{
    ComponentClass, ComponentDefinition, ComponentKind, ComponentRegistry, SINGLETON_SCOPE,
};
pub use web::{GenericWebApplicationContext, ServletContext, ServletContextResource};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building contexts
    pub use crate::{
        AnnotationConfigApplicationContext, ApplicationContext, ComponentClass, ContextError,
        EnvironmentCapable, GenericApplicationContext, GenericWebApplicationContext,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
