//! Web application context
//!
//! [`GenericWebApplicationContext`] runs inside a servlet container
//! described by a [`ServletContext`]. It takes its application name from
//! the context path, exposes the container's init parameters as a property
//! source and registers the web scopes. Config-location based setup is not
//! supported: components are registered programmatically.

use crate::context::{ApplicationContext, ContextState, GenericApplicationContext, RefreshHooks};
use crate::env::{EnvironmentCapable, PropertySource, StandardEnvironment, SERVLET_CONTEXT_SOURCE};
use crate::error::ContextError;
use crate::registry::{ComponentDefinition, ComponentRegistry};
use chrono::{DateTime, Utc};
use sprout_metrics::ApplicationStartup;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Request scope name
pub const SCOPE_REQUEST: &str = "request";
/// Session scope name
pub const SCOPE_SESSION: &str = "session";
/// Application (servlet context) scope name
pub const SCOPE_APPLICATION: &str = "application";
/// Singleton exposing the servlet context
pub const SERVLET_CONTEXT_SINGLETON: &str = "servletContext";
/// Singleton exposing the init parameters
pub const CONTEXT_PARAMETERS_SINGLETON: &str = "contextParameters";

const CONTEXT_NAME: &str = "GenericWebApplicationContext";

/// Container the web context runs in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServletContext {
    context_path: String,
    init_parameters: BTreeMap<String, String>,
    resource_base: Option<PathBuf>,
}

impl ServletContext {
    /// Create for a context path (`""` for the root context, else `/name`)
    #[must_use]
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            ..Self::default()
        }
    }

    /// With an init parameter
    #[must_use]
    pub fn with_init_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.init_parameters.insert(key.into(), value.into());
        self
    }

    /// With the directory resources are served from
    #[must_use]
    pub fn with_resource_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.resource_base = Some(base.into());
        self
    }

    /// Context path
    #[inline]
    #[must_use]
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Init parameters
    #[inline]
    #[must_use]
    pub fn init_parameters(&self) -> &BTreeMap<String, String> {
        &self.init_parameters
    }

    /// Resource directory
    #[inline]
    #[must_use]
    pub fn resource_base(&self) -> Option<&Path> {
        self.resource_base.as_deref()
    }
}

/// Resource addressed relative to the servlet context root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServletContextResource {
    path: String,
    file: Option<PathBuf>,
}

impl ServletContextResource {
    /// Path below the context root, always starting with `/`
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File backing the resource, when the container has a resource base
    #[inline]
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Check if the backing file exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.file.as_deref().is_some_and(Path::exists)
    }
}

/// Context for web applications
#[derive(Debug)]
pub struct GenericWebApplicationContext {
    context: GenericApplicationContext,
    servlet_context: Option<ServletContext>,
}

impl GenericWebApplicationContext {
    /// Create without a servlet context
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: GenericApplicationContext::with_environment(StandardEnvironment::servlet()),
            servlet_context: None,
        }
    }

    /// Create for a servlet context
    #[must_use]
    pub fn with_servlet_context(servlet_context: ServletContext) -> Self {
        let mut ctx = Self::new();
        ctx.servlet_context = Some(servlet_context);
        ctx
    }

    /// With instrumentation
    #[must_use]
    pub fn with_application_startup(mut self, startup: Arc<dyn ApplicationStartup>) -> Self {
        self.context.set_application_startup(startup);
        self
    }

    /// Set or clear the servlet context
    pub fn set_servlet_context(&mut self, servlet_context: Option<ServletContext>) {
        self.servlet_context = servlet_context;
    }

    /// Servlet context, if any
    #[inline]
    #[must_use]
    pub fn servlet_context(&self) -> Option<&ServletContext> {
        self.servlet_context.as_ref()
    }

    /// Register a definition
    ///
    /// # Errors
    /// See [`GenericApplicationContext::register_definition`].
    pub fn register_definition(&mut self, definition: ComponentDefinition) -> Result<(), ContextError> {
        self.context.register_definition(definition)
    }

    /// Finish configuration with the web hooks
    ///
    /// # Errors
    /// See [`GenericApplicationContext::refresh_with`].
    pub fn refresh(&mut self) -> Result<(), ContextError> {
        let mut hooks = WebRefreshHooks {
            servlet_context: self.servlet_context.as_ref(),
        };
        self.context.refresh_with(&mut hooks)
    }

    /// Close the context
    pub fn close(&mut self) {
        self.context.close();
    }

    /// Lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.context.state()
    }

    /// Resolve `path` below the servlet context root
    ///
    /// # Errors
    /// - [`ContextError::NoServletContext`] without a servlet context
    pub fn resource_by_path(&self, path: &str) -> Result<ServletContextResource, ContextError> {
        let servlet_context = self.servlet_context.as_ref().ok_or(ContextError::NoServletContext)?;
        let relative = path.trim_start_matches('/');
        Ok(ServletContextResource {
            path: format!("/{relative}"),
            file: servlet_context.resource_base().map(|base| base.join(relative)),
        })
    }

    /// Accepted and ignored
    pub fn set_servlet_config(&mut self, _servlet_config: Option<BTreeMap<String, String>>) {}

    /// Not supported
    ///
    /// # Errors
    /// Always [`ContextError::Unsupported`].
    pub fn servlet_config(&self) -> Result<&BTreeMap<String, String>, ContextError> {
        Err(unsupported("servlet_config()"))
    }

    /// Accepted and ignored
    pub fn set_namespace(&mut self, _namespace: Option<&str>) {}

    /// Not supported
    ///
    /// # Errors
    /// Always [`ContextError::Unsupported`].
    pub fn namespace(&self) -> Result<&str, ContextError> {
        Err(unsupported("namespace()"))
    }

    /// Rejects any non-blank location
    ///
    /// # Errors
    /// [`ContextError::Unsupported`] when `location` has text; a leftover
    /// `contextConfigLocation` init parameter is the usual cause.
    pub fn set_config_location(&mut self, location: &str) -> Result<(), ContextError> {
        if location.trim().is_empty() {
            Ok(())
        } else {
            Err(unsupported("set_config_location()"))
        }
    }

    /// Rejects any non-empty list
    ///
    /// # Errors
    /// [`ContextError::Unsupported`] when `locations` is not empty.
    pub fn set_config_locations(&mut self, locations: &[&str]) -> Result<(), ContextError> {
        if locations.is_empty() {
            Ok(())
        } else {
            Err(unsupported("set_config_locations()"))
        }
    }

    /// Not supported
    ///
    /// # Errors
    /// Always [`ContextError::Unsupported`].
    pub fn config_locations(&self) -> Result<Vec<String>, ContextError> {
        Err(unsupported("config_locations()"))
    }

    /// Underlying generic context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &GenericApplicationContext {
        &self.context
    }

    /// Underlying generic context, mutably
    #[inline]
    pub fn context_mut(&mut self) -> &mut GenericApplicationContext {
        &mut self.context
    }
}

impl Default for GenericWebApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(operation: &'static str) -> ContextError {
    ContextError::Unsupported {
        context: CONTEXT_NAME,
        operation,
    }
}

struct WebRefreshHooks<'a> {
    servlet_context: Option<&'a ServletContext>,
}

impl RefreshHooks for WebRefreshHooks<'_> {
    fn init_property_sources(&mut self, environment: &mut StandardEnvironment) -> Result<(), ContextError> {
        if let Some(servlet_context) = self.servlet_context {
            environment.replace(PropertySource::new(
                SERVLET_CONTEXT_SOURCE,
                servlet_context.init_parameters().clone(),
            ));
        }
        Ok(())
    }

    fn post_process_registry(&mut self, registry: &mut ComponentRegistry) -> Result<(), ContextError> {
        registry.register_scope(SCOPE_REQUEST);
        registry.register_scope(SCOPE_SESSION);
        if let Some(servlet_context) = self.servlet_context {
            registry.register_scope(SCOPE_APPLICATION);
            registry.register_singleton(
                SERVLET_CONTEXT_SINGLETON,
                format!("servlet context at {:?}", servlet_context.context_path()),
            );
            registry.register_singleton(
                CONTEXT_PARAMETERS_SINGLETON,
                format!("{:?}", servlet_context.init_parameters()),
            );
        }
        Ok(())
    }
}

impl EnvironmentCapable for GenericWebApplicationContext {
    fn environment(&self) -> &StandardEnvironment {
        self.context.environment()
    }
}

impl ApplicationContext for GenericWebApplicationContext {
    fn id(&self) -> &str {
        self.context.id()
    }

    fn application_name(&self) -> &str {
        self.servlet_context
            .as_ref()
            .map_or("", ServletContext::context_path)
    }

    fn display_name(&self) -> &str {
        self.context.display_name()
    }

    fn startup_date(&self) -> Option<DateTime<Utc>> {
        self.context.startup_date()
    }

    fn parent(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.context.parent()
    }

    fn application_startup(&self) -> &Arc<dyn ApplicationStartup> {
        self.context.application_startup()
    }

    fn registry(&self) -> &ComponentRegistry {
        self.context.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_name_is_context_path() {
        assert_eq!(GenericWebApplicationContext::new().application_name(), "");
        let ctx = GenericWebApplicationContext::with_servlet_context(ServletContext::new("/shop"));
        assert_eq!(ctx.application_name(), "/shop");
    }

    #[test]
    fn resources_need_a_servlet_context() {
        let ctx = GenericWebApplicationContext::new();
        assert!(matches!(ctx.resource_by_path("/index.html"), Err(ContextError::NoServletContext)));

        let ctx = GenericWebApplicationContext::with_servlet_context(
            ServletContext::new("/shop").with_resource_base("/srv/www"),
        );
        let resource = ctx.resource_by_path("static/app.js").unwrap();
        assert_eq!(resource.path(), "/static/app.js");
        assert_eq!(resource.file(), Some(Path::new("/srv/www/static/app.js")));
    }

    #[test]
    fn config_locations_are_unsupported() {
        let mut ctx = GenericWebApplicationContext::new();
        assert!(ctx.set_config_location("  ").is_ok());
        assert!(ctx.set_config_locations(&[]).is_ok());
        assert!(ctx.set_config_location("classpath:app.xml").unwrap_err().is_unsupported());
        assert!(ctx.set_config_locations(&["a.xml"]).unwrap_err().is_unsupported());
        assert!(ctx.config_locations().unwrap_err().is_unsupported());
        assert!(ctx.namespace().unwrap_err().is_unsupported());
        assert!(ctx.servlet_config().unwrap_err().is_unsupported());

        ctx.set_namespace(Some("dispatcher"));
        ctx.set_servlet_config(None);
    }
}
