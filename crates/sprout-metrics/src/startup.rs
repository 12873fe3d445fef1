//! Application startup instrumentation contract
//!
//! Core infrastructure marks startup phases with [`ApplicationStartup`] and
//! attaches data about the execution context to each step. The recorder is
//! handed to each subsystem at construction time rather than reached
//! through global state, so tests can inject a capturing recorder.

use crate::error::StartupError;
use crate::step::StartupStep;
use std::fmt::Debug;
use std::sync::Arc;

/// Factory for [`StartupStep`]s
pub trait ApplicationStartup: Send + Sync + Debug {
    /// Create a new step and mark its beginning
    ///
    /// # Errors
    /// - [`StartupError::EmptyName`] or [`StartupError::InvalidName`] when
    ///   `name` is not a dotted identifier
    fn try_start(&self, name: &str) -> Result<StartupStep, StartupError>;

    /// Create a new step and mark its beginning
    ///
    /// The name describes the current action or phase. It should be a
    /// `.`-namespaced identifier and can be reused for other instances of
    /// the same phase.
    ///
    /// # Panics
    /// When `name` is not a valid step name; step names are structural
    /// identifiers chosen by the caller, not user data.
    fn start(&self, name: &str) -> StartupStep {
        match self.try_start(name) {
            Ok(step) => step,
            Err(err) => panic!("cannot start startup step: {err}"),
        }
    }
}

impl<T: ApplicationStartup + ?Sized> ApplicationStartup for Arc<T> {
    fn try_start(&self, name: &str) -> Result<StartupStep, StartupError> {
        (**self).try_start(name)
    }
}

impl<T: ApplicationStartup + ?Sized> ApplicationStartup for &T {
    fn try_start(&self, name: &str) -> Result<StartupStep, StartupError> {
        (**self).try_start(name)
    }
}

/// Default "no op" [`ApplicationStartup`]
///
/// Records nothing and accepts any name without validation, so it adds no
/// measurable overhead.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultApplicationStartup;

impl DefaultApplicationStartup {
    /// Shared trait object for wiring into contexts
    #[inline]
    #[must_use]
    pub fn shared() -> Arc<dyn ApplicationStartup> {
        Arc::new(Self)
    }
}

impl ApplicationStartup for DefaultApplicationStartup {
    #[inline]
    fn try_start(&self, _name: &str) -> Result<StartupStep, StartupError> {
        Ok(StartupStep::noop())
    }

    #[inline]
    fn start(&self, _name: &str) -> StartupStep {
        StartupStep::noop()
    }
}

/// Check that `name` follows the dotted step naming convention
///
/// Names are non-empty, contain no whitespace or control characters, and
/// have no empty `.`-separated segments.
///
/// # Errors
/// Returns the violated rule.
pub fn validate_step_name(name: &str) -> Result<(), StartupError> {
    if name.is_empty() {
        return Err(StartupError::EmptyName);
    }
    let invalid = |reason: &'static str| StartupError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("whitespace or control character"));
    }
    if name.split('.').any(str::is_empty) {
        return Err(invalid("empty namespace segment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_names() {
        assert!(validate_step_name("app.init").is_ok());
        assert!(validate_step_name("spring.context.annotated-bean-reader.create").is_ok());
        assert!(validate_step_name("single").is_ok());
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(matches!(validate_step_name(""), Err(StartupError::EmptyName)));
        assert!(validate_step_name("app init").is_err());
        assert!(validate_step_name(".app").is_err());
        assert!(validate_step_name("app..init").is_err());
        assert!(validate_step_name("app.").is_err());
    }

    #[test]
    fn default_startup_accepts_any_name() {
        let startup = DefaultApplicationStartup;
        assert!(startup.try_start("").is_ok());
        startup.start("not a dotted name").end();
    }
}
