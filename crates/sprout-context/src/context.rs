//! Application context contract and the generic implementation
//!
//! A context owns an environment, a component registry and the
//! [`ApplicationStartup`] used to instrument its own startup phases.

use crate::condition::{ConditionContext, ConditionEvaluator, ConfigurationPhase};
use crate::env::{EnvironmentCapable, StandardEnvironment};
use crate::error::ContextError;
use crate::registry::{ComponentDefinition, ComponentRegistry};
use chrono::{DateTime, Utc};
use sprout_metrics::{ApplicationStartup, DefaultApplicationStartup};
use std::fmt;
use std::sync::Arc;

/// Read-only view of a configured application
pub trait ApplicationContext: EnvironmentCapable + Send + Sync {
    /// Unique id of this context
    fn id(&self) -> &str;

    /// Name of the deployed application, empty by default
    fn application_name(&self) -> &str;

    /// Friendly name of this context
    fn display_name(&self) -> &str;

    /// When the context was first refreshed
    fn startup_date(&self) -> Option<DateTime<Utc>>;

    /// Parent context, `None` at the root of a hierarchy
    fn parent(&self) -> Option<&Arc<dyn ApplicationContext>>;

    /// Instrumentation used for this context's startup phases
    fn application_startup(&self) -> &Arc<dyn ApplicationStartup>;

    /// Registered components
    fn registry(&self) -> &ComponentRegistry;
}

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created, accepting registrations
    Created,
    /// Refreshed successfully
    Active,
    /// Refresh was attempted and failed
    Failed,
    /// Closed
    Closed,
}

/// Extension points invoked during [`GenericApplicationContext::refresh_with`]
pub trait RefreshHooks {
    /// Replace placeholder property sources with real ones
    ///
    /// # Errors
    /// Aborts the refresh.
    fn init_property_sources(&mut self, _environment: &mut StandardEnvironment) -> Result<(), ContextError> {
        Ok(())
    }

    /// Adjust the registry before conditions are applied
    ///
    /// # Errors
    /// Aborts the refresh.
    fn post_process_registry(&mut self, _registry: &mut ComponentRegistry) -> Result<(), ContextError> {
        Ok(())
    }

    /// Context-specific initialization once the registry is final
    ///
    /// # Errors
    /// Aborts the refresh.
    fn on_refresh(&mut self, _registry: &ComponentRegistry) -> Result<(), ContextError> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefreshHooks;

impl RefreshHooks for NoRefreshHooks {}

/// General-purpose context holding a single registry
///
/// Register components, then call [`refresh`](Self::refresh) exactly once.
pub struct GenericApplicationContext {
    id: String,
    display_name: String,
    parent: Option<Arc<dyn ApplicationContext>>,
    environment: StandardEnvironment,
    registry: ComponentRegistry,
    application_startup: Arc<dyn ApplicationStartup>,
    startup_date: Option<DateTime<Utc>>,
    state: ContextState,
}

impl GenericApplicationContext {
    /// Create with a standard environment and no instrumentation
    #[must_use]
    pub fn new() -> Self {
        Self::with_environment(StandardEnvironment::new())
    }

    /// Create with the given environment
    #[must_use]
    pub fn with_environment(environment: StandardEnvironment) -> Self {
        let id = format!("context-{}", uuid::Uuid::new_v4().simple());
        Self {
            display_name: id.clone(),
            id,
            parent: None,
            environment,
            registry: ComponentRegistry::new(),
            application_startup: DefaultApplicationStartup::shared(),
            startup_date: None,
            state: ContextState::Created,
        }
    }

    /// With instrumentation
    #[must_use]
    pub fn with_application_startup(mut self, startup: Arc<dyn ApplicationStartup>) -> Self {
        self.application_startup = startup;
        self
    }

    /// With a unique id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    /// With a friendly name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// With a parent context
    #[must_use]
    pub fn with_parent(mut self, parent: Arc<dyn ApplicationContext>) -> Self {
        self.set_parent(parent);
        self
    }

    /// Set the unique id
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Set the parent and inherit its property sources and profiles
    pub fn set_parent(&mut self, parent: Arc<dyn ApplicationContext>) {
        self.environment.merge(parent.environment());
        self.parent = Some(parent);
    }

    /// Replace the environment
    pub fn set_environment(&mut self, environment: StandardEnvironment) {
        self.environment = environment;
    }

    /// Replace the instrumentation
    pub fn set_application_startup(&mut self, startup: Arc<dyn ApplicationStartup>) {
        self.application_startup = startup;
    }

    /// Mutable environment
    #[inline]
    pub fn environment_mut(&mut self) -> &mut StandardEnvironment {
        &mut self.environment
    }

    /// Mutable registry
    #[inline]
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Register a single definition
    ///
    /// # Errors
    /// - [`ContextError::Closed`] after `close`
    /// - [`ContextError::DuplicateComponent`] on a name clash
    pub fn register_definition(&mut self, definition: ComponentDefinition) -> Result<(), ContextError> {
        if self.state == ContextState::Closed {
            return Err(ContextError::Closed);
        }
        self.registry.register(definition)
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Check if refresh completed and the context is not closed
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ContextState::Active
    }

    /// Refresh with no extra hooks
    ///
    /// # Errors
    /// See [`refresh_with`](Self::refresh_with).
    pub fn refresh(&mut self) -> Result<(), ContextError> {
        self.refresh_with(&mut NoRefreshHooks)
    }

    /// Finish configuration: resolve property sources, apply
    /// `RegisterBean`-phase conditions, run context hooks
    ///
    /// Recorded as `spring.context.refresh`, with the registry processing
    /// nested as `spring.context.beans.post-process`.
    ///
    /// # Errors
    /// - [`ContextError::AlreadyRefreshed`] on any second attempt
    /// - [`ContextError::Closed`] after `close`
    /// - [`ContextError::MissingRequiredProperties`] from the environment
    /// - any error raised by `hooks`
    pub fn refresh_with(&mut self, hooks: &mut dyn RefreshHooks) -> Result<(), ContextError> {
        match self.state {
            ContextState::Created => {}
            ContextState::Closed => return Err(ContextError::Closed),
            ContextState::Active | ContextState::Failed => return Err(ContextError::AlreadyRefreshed),
        }
        let startup = Arc::clone(&self.application_startup);
        let mut refresh_step = startup.start("spring.context.refresh");
        self.startup_date = Some(Utc::now());
        tracing::info!(context = %self.display_name, "refreshing context");

        match self.run_refresh(startup.as_ref(), hooks) {
            Ok(()) => {
                self.state = ContextState::Active;
                let components = self.registry.len();
                refresh_step.add_tag_with("components", move || components.to_string());
                refresh_step.end();
                tracing::debug!(context = %self.display_name, components, "context refreshed");
                Ok(())
            }
            Err(err) => {
                self.state = ContextState::Failed;
                refresh_step.add_tag("failure", err.to_string());
                refresh_step.end();
                tracing::warn!(context = %self.display_name, error = %err, "context refresh failed");
                Err(err)
            }
        }
    }

    fn run_refresh(
        &mut self,
        startup: &dyn ApplicationStartup,
        hooks: &mut dyn RefreshHooks,
    ) -> Result<(), ContextError> {
        hooks.init_property_sources(&mut self.environment)?;
        self.environment.validate_required_properties()?;

        let post_process = startup.start("spring.context.beans.post-process");
        hooks.post_process_registry(&mut self.registry)?;
        let skipped = self.apply_register_phase_conditions();
        post_process
            .tag_with("skipped", move || format!("{skipped:?}"))
            .end();

        hooks.on_refresh(&self.registry)
    }

    /// Re-check configuration components now that all of them are known
    fn apply_register_phase_conditions(&mut self) -> Vec<String> {
        let skipped: Vec<String> = {
            let context = ConditionContext {
                environment: &self.environment,
                registry: &self.registry,
            };
            self.registry
                .definitions()
                .filter(|d| d.is_configuration())
                .filter(|d| {
                    ConditionEvaluator.should_skip(&context, d, Some(ConfigurationPhase::RegisterBean))
                })
                .map(|d| d.name.clone())
                .collect()
        };
        for name in &skipped {
            tracing::debug!(component = %name, "skipping component: condition did not match");
            self.registry.remove(name);
        }
        skipped
    }

    /// Close the context; further refreshes and registrations fail
    pub fn close(&mut self) {
        if self.state != ContextState::Closed {
            tracing::info!(context = %self.display_name, "closing context");
            self.state = ContextState::Closed;
        }
    }
}

impl Default for GenericApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GenericApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericApplicationContext")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("parent", &self.parent.as_ref().map(|p| p.id().to_string()))
            .field("state", &self.state)
            .field("components", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl EnvironmentCapable for GenericApplicationContext {
    fn environment(&self) -> &StandardEnvironment {
        &self.environment
    }
}

impl ApplicationContext for GenericApplicationContext {
    fn id(&self) -> &str {
        &self.id
    }

    fn application_name(&self) -> &str {
        ""
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn startup_date(&self) -> Option<DateTime<Utc>> {
        self.startup_date
    }

    fn parent(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.parent.as_ref()
    }

    fn application_startup(&self) -> &Arc<dyn ApplicationStartup> {
        &self.application_startup
    }

    fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionRef, OnComponentCondition};
    use crate::env::PropertySource;
    use crate::registry::ComponentClass;
    use sprout_metrics::{FlightRecorderApplicationStartup, MemoryRecorder};

    fn context() -> GenericApplicationContext {
        GenericApplicationContext::with_environment(StandardEnvironment::empty())
    }

    #[test]
    fn refresh_only_once() {
        let mut ctx = context();
        assert!(ctx.startup_date().is_none());
        ctx.refresh().unwrap();

        assert!(ctx.is_active());
        assert!(ctx.startup_date().is_some());
        assert!(matches!(ctx.refresh(), Err(ContextError::AlreadyRefreshed)));
    }

    #[test]
    fn closed_context_rejects_work() {
        let mut ctx = context();
        ctx.close();

        assert!(matches!(ctx.refresh(), Err(ContextError::Closed)));
        let def = ComponentClass::component("a.B").into_definition("b".into());
        assert!(matches!(ctx.register_definition(def), Err(ContextError::Closed)));
    }

    #[test]
    fn refresh_drops_configuration_failing_register_phase() {
        let mut ctx = context();
        ctx.register_definition(
            ComponentClass::configuration("a.CacheConfig")
                .when(ConditionRef::phased(OnComponentCondition::present("dataSource")))
                .into_definition("cacheConfig".into()),
        )
        .unwrap();
        ctx.register_definition(ComponentClass::configuration("a.WebConfig").into_definition("webConfig".into()))
            .unwrap();

        ctx.refresh().unwrap();
        assert_eq!(ctx.registry().names(), vec!["webConfig"]);
    }

    #[test]
    fn refresh_failure_is_recorded_and_final() {
        let events = Arc::new(MemoryRecorder::new());
        let mut ctx = context().with_application_startup(Arc::new(
            FlightRecorderApplicationStartup::with_recorder(events.clone()),
        ));
        ctx.environment_mut().set_required_properties(["db.url"]);

        let err = ctx.refresh().unwrap_err();
        assert!(matches!(err, ContextError::MissingRequiredProperties(_)));
        assert_eq!(ctx.state(), ContextState::Failed);
        assert!(events.find("spring.context.refresh").unwrap().tags.contains("failure="));

        ctx.environment_mut()
            .add_first(PropertySource::stub("late").with("db.url", "mem"));
        assert!(matches!(ctx.refresh(), Err(ContextError::AlreadyRefreshed)));
    }

    #[test]
    fn parent_environment_is_merged() {
        let parent = GenericApplicationContext::with_environment(
            StandardEnvironment::empty().with_source(PropertySource::stub("parent").with("shared", "yes")),
        )
        .with_id("parent");
        let child = context().with_parent(Arc::new(parent));

        assert_eq!(child.parent().map(|p| p.id()), Some("parent"));
        assert_eq!(child.environment().get_property("shared"), Some("yes"));
    }
}
