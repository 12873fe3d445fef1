//! Annotation-driven context
//!
//! [`AnnotationConfigApplicationContext`] accepts component types directly
//! ([`register`](AnnotationConfigApplicationContext::register)) or looks
//! them up by package through a [`ComponentScanner`]
//! ([`scan`](AnnotationConfigApplicationContext::scan)). Both phases are
//! recorded as startup steps.

use crate::condition::{ConditionContext, ConditionEvaluator, ConditionRef, OnProfileCondition, OnPropertyCondition};
use crate::context::{ApplicationContext, GenericApplicationContext};
use crate::env::{EnvironmentCapable, StandardEnvironment};
use crate::error::ContextError;
use crate::registry::{ComponentClass, ComponentKind, ComponentRegistry, SINGLETON_SCOPE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprout_metrics::ApplicationStartup;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// Singleton name under which a custom [`NameGenerator`] is exposed
pub const NAME_GENERATOR_SINGLETON: &str = "sprout.context.internalComponentNameGenerator";

/// Derives component names for types registered without one
pub trait NameGenerator: Send + Sync + Debug {
    /// Name for `class`
    fn generate_name(&self, class: &ComponentClass, registry: &ComponentRegistry) -> String;
}

/// Explicit name, else the short type name with a lowercase first letter
///
/// Names starting with two uppercase letters (`URLResolver`) are kept as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationNameGenerator;

impl NameGenerator for AnnotationNameGenerator {
    fn generate_name(&self, class: &ComponentClass, _registry: &ComponentRegistry) -> String {
        class
            .name
            .clone()
            .unwrap_or_else(|| decapitalize(class.short_name()))
    }
}

/// Explicit name, else the fully qualified type name
#[derive(Debug, Clone, Copy, Default)]
pub struct FullyQualifiedNameGenerator;

impl NameGenerator for FullyQualifiedNameGenerator {
    fn generate_name(&self, class: &ComponentClass, _registry: &ComponentRegistry) -> String {
        class.name.clone().unwrap_or_else(|| class.type_name.clone())
    }
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => name.to_string(),
        (Some(first), _) => first.to_lowercase().chain(name[first.len_utf8()..].chars()).collect(),
        (None, _) => String::new(),
    }
}

/// Finds candidate component types below a base package
pub trait ComponentScanner: Send + Sync + Debug {
    /// Candidates under `base_package`
    fn find_candidates(&self, base_package: &str) -> Vec<ComponentClass>;
}

/// Scanner that finds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScanner;

impl ComponentScanner for EmptyScanner {
    fn find_candidates(&self, _base_package: &str) -> Vec<ComponentClass> {
        Vec::new()
    }
}

/// Catalog entry describing a scannable component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Fully qualified type path
    pub type_name: String,
    /// Role of the type
    #[serde(default)]
    pub kind: ComponentKind,
    /// Explicit component name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Scope name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Register only when this property is set (and not `false`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_property: Option<String>,
    /// Register only for these profiles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
}

impl CatalogEntry {
    fn to_class(&self) -> ComponentClass {
        let mut class = match self.kind {
            ComponentKind::Component => ComponentClass::component(&self.type_name),
            ComponentKind::Configuration => ComponentClass::configuration(&self.type_name),
        };
        class.name.clone_from(&self.name);
        if let Some(scope) = &self.scope {
            class = class.scoped(scope);
        }
        if let Some(property) = &self.on_property {
            class = class.when(ConditionRef::new(OnPropertyCondition::new(property)));
        }
        if !self.profiles.is_empty() {
            class = class.when(ConditionRef::new(OnProfileCondition::new(self.profiles.iter().cloned())));
        }
        class
    }

    /// Check if the type lives at or below `base_package`
    fn is_under(&self, base_package: &str) -> bool {
        let package = base_package.trim_end_matches(['.', ':']);
        package.is_empty()
            || self.type_name.strip_prefix(package).is_some_and(|rest| {
                rest.starts_with('.') || rest.starts_with("::")
            })
    }
}

/// Scanner backed by a static list of components
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogScanner {
    /// Known components
    pub components: Vec<CatalogEntry>,
}

impl CatalogScanner {
    /// Create from entries
    #[must_use]
    pub fn new(components: Vec<CatalogEntry>) -> Self {
        Self { components }
    }

    /// Load a JSON catalog (`{"components": [...]}`)
    ///
    /// # Errors
    /// - [`ContextError::Io`] if the file cannot be read
    /// - [`ContextError::Catalog`] if the JSON is malformed
    pub fn from_json_file(path: &Path) -> Result<Self, ContextError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ComponentScanner for CatalogScanner {
    fn find_candidates(&self, base_package: &str) -> Vec<ComponentClass> {
        self.components
            .iter()
            .filter(|entry| entry.is_under(base_package))
            .map(CatalogEntry::to_class)
            .collect()
    }
}

/// Turns component types into registered definitions
///
/// Evaluates conditions for the type's default phase before registering.
#[derive(Debug, Clone)]
pub struct AnnotatedDefinitionReader {
    name_generator: Arc<dyn NameGenerator>,
}

impl AnnotatedDefinitionReader {
    /// Create with the default name generator
    #[must_use]
    pub fn new() -> Self {
        Self {
            name_generator: Arc::new(AnnotationNameGenerator),
        }
    }

    /// Replace the name generator
    pub fn set_name_generator(&mut self, generator: Arc<dyn NameGenerator>) {
        self.name_generator = generator;
    }

    /// Register `class`, returning its name, or `None` when a condition skipped it
    ///
    /// # Errors
    /// - [`ContextError::InvalidArgument`] if the generated name is empty
    /// - [`ContextError::DuplicateComponent`] on a name clash
    pub fn register(
        &self,
        class: ComponentClass,
        context: &mut GenericApplicationContext,
    ) -> Result<Option<String>, ContextError> {
        let name = self.name_generator.generate_name(&class, context.registry());
        if name.is_empty() {
            return Err(ContextError::InvalidArgument("component name must not be empty"));
        }
        let definition = class.into_definition(name.clone());
        let skip = {
            let conditions = ConditionContext {
                environment: context.environment(),
                registry: context.registry(),
            };
            ConditionEvaluator.should_skip(&conditions, &definition, None)
        };
        if skip {
            tracing::debug!(component = %name, "skipping component: condition did not match");
            return Ok(None);
        }
        context.register_definition(definition)?;
        Ok(Some(name))
    }
}

impl Default for AnnotatedDefinitionReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers what a [`ComponentScanner`] finds
#[derive(Debug, Clone)]
pub struct PackageDefinitionScanner {
    scanner: Arc<dyn ComponentScanner>,
    reader: AnnotatedDefinitionReader,
}

impl PackageDefinitionScanner {
    /// Create around a scanner
    #[must_use]
    pub fn new(scanner: Arc<dyn ComponentScanner>) -> Self {
        Self {
            scanner,
            reader: AnnotatedDefinitionReader::new(),
        }
    }

    /// Replace the name generator
    pub fn set_name_generator(&mut self, generator: Arc<dyn NameGenerator>) {
        self.reader.set_name_generator(generator);
    }

    /// Register candidates of every package, returning how many were added
    ///
    /// A candidate whose type is already registered is skipped silently.
    ///
    /// # Errors
    /// - [`ContextError::DuplicateComponent`] when a candidate's name is
    ///   taken by a different type
    pub fn scan(&self, packages: &[&str], context: &mut GenericApplicationContext) -> Result<usize, ContextError> {
        let before = context.registry().len();
        for package in packages {
            for candidate in self.scanner.find_candidates(package) {
                if context.registry().contains_type(&candidate.type_name) {
                    continue;
                }
                self.reader.register(candidate, context)?;
            }
        }
        Ok(context.registry().len().saturating_sub(before))
    }
}

/// Context configured from component types and scanned packages
///
/// ```rust
/// use sprout_context::{AnnotationConfigApplicationContext, ApplicationContext, ComponentClass};
/// use sprout_metrics::{FlightRecorderApplicationStartup, MemoryRecorder};
/// use std::sync::Arc;
///
/// let events = Arc::new(MemoryRecorder::new());
/// let startup = Arc::new(FlightRecorderApplicationStartup::with_recorder(events.clone()));
///
/// let ctx = AnnotationConfigApplicationContext::from_components(
///     startup,
///     vec![ComponentClass::configuration("com.example.AppConfig")],
/// )
/// .unwrap();
///
/// assert_eq!(ctx.registry().names(), vec!["appConfig"]);
/// assert!(events.find("spring.context.component-classes.register").is_some());
/// ```
#[derive(Debug)]
pub struct AnnotationConfigApplicationContext {
    context: GenericApplicationContext,
    reader: AnnotatedDefinitionReader,
    scanner: PackageDefinitionScanner,
}

impl AnnotationConfigApplicationContext {
    /// Create an empty context with no instrumentation
    #[must_use]
    pub fn new() -> Self {
        Self::from_context(GenericApplicationContext::new())
    }

    /// Create an empty context recording to `startup`
    #[must_use]
    pub fn with_startup(startup: Arc<dyn ApplicationStartup>) -> Self {
        Self::from_context(GenericApplicationContext::new().with_application_startup(startup))
    }

    /// Wrap an already configured generic context
    #[must_use]
    pub fn from_context(context: GenericApplicationContext) -> Self {
        let step = context
            .application_startup()
            .start("spring.context.annotated-bean-reader.create");
        let reader = AnnotatedDefinitionReader::new();
        step.end();
        Self {
            context,
            reader,
            scanner: PackageDefinitionScanner::new(Arc::new(EmptyScanner)),
        }
    }

    /// Register `classes` and refresh
    ///
    /// # Errors
    /// See [`register`](Self::register) and [`refresh`](Self::refresh).
    pub fn from_components(
        startup: Arc<dyn ApplicationStartup>,
        classes: Vec<ComponentClass>,
    ) -> Result<Self, ContextError> {
        let mut ctx = Self::with_startup(startup);
        ctx.register(classes)?;
        ctx.refresh()?;
        Ok(ctx)
    }

    /// Scan `packages` through `scanner` and refresh
    ///
    /// # Errors
    /// See [`scan`](Self::scan) and [`refresh`](Self::refresh).
    pub fn from_packages(
        startup: Arc<dyn ApplicationStartup>,
        scanner: Arc<dyn ComponentScanner>,
        packages: &[&str],
    ) -> Result<Self, ContextError> {
        let mut ctx = Self::with_startup(startup).with_scanner(scanner);
        ctx.scan(packages)?;
        ctx.refresh()?;
        Ok(ctx)
    }

    /// With the scanner used by [`scan`](Self::scan)
    #[must_use]
    pub fn with_scanner(mut self, scanner: Arc<dyn ComponentScanner>) -> Self {
        let mut replacement = PackageDefinitionScanner::new(scanner);
        replacement.set_name_generator(Arc::clone(&self.reader.name_generator));
        self.scanner = replacement;
        self
    }

    /// Replace the environment
    pub fn set_environment(&mut self, environment: StandardEnvironment) {
        self.context.set_environment(environment);
    }

    /// Use `generator` for registered and scanned components
    ///
    /// Call before `register` or `scan`.
    pub fn set_name_generator(&mut self, generator: Arc<dyn NameGenerator>) {
        self.reader.set_name_generator(Arc::clone(&generator));
        self.scanner.set_name_generator(Arc::clone(&generator));
        self.context
            .registry_mut()
            .register_singleton(NAME_GENERATOR_SINGLETON, format!("{generator:?}"));
    }

    /// Register component types
    ///
    /// Recorded as `spring.context.component-classes.register` tagged with
    /// the type names. Returns the names of the registered components;
    /// types skipped by a condition are left out.
    ///
    /// # Errors
    /// - [`ContextError::InvalidArgument`] if `classes` is empty or a name comes out empty
    /// - [`ContextError::DuplicateComponent`] on a name clash
    pub fn register(&mut self, classes: Vec<ComponentClass>) -> Result<Vec<String>, ContextError> {
        if classes.is_empty() {
            return Err(ContextError::InvalidArgument(
                "At least one component class must be specified",
            ));
        }
        let type_names: Vec<String> = classes.iter().map(|c| c.type_name.clone()).collect();
        let step = self
            .context
            .application_startup()
            .start("spring.context.component-classes.register")
            .tag_with("classes", move || format!("[{}]", type_names.join(", ")));

        let mut registered = Vec::with_capacity(classes.len());
        for class in classes {
            if let Some(name) = self.reader.register(class, &mut self.context)? {
                registered.push(name);
            }
        }
        step.end();
        Ok(registered)
    }

    /// Register one component, named explicitly or by the name generator
    ///
    /// # Errors
    /// - [`ContextError::InvalidArgument`] if the name is empty
    /// - [`ContextError::DuplicateComponent`] on a name clash
    pub fn register_component(
        &mut self,
        name: Option<&str>,
        mut class: ComponentClass,
    ) -> Result<Option<String>, ContextError> {
        if let Some(name) = name {
            class.name = Some(name.to_string());
        }
        self.reader.register(class, &mut self.context)
    }

    /// Scan base packages
    ///
    /// Recorded as `spring.context.base-packages.scan` tagged with the
    /// packages. Returns how many components were added.
    ///
    /// # Errors
    /// - [`ContextError::InvalidArgument`] if `packages` is empty
    /// - [`ContextError::DuplicateComponent`] on a name clash
    pub fn scan(&mut self, packages: &[&str]) -> Result<usize, ContextError> {
        if packages.is_empty() {
            return Err(ContextError::InvalidArgument(
                "At least one base package must be specified",
            ));
        }
        let listed = packages.join(", ");
        let step = self
            .context
            .application_startup()
            .start("spring.context.base-packages.scan")
            .tag_with("packages", move || format!("[{listed}]"));
        let added = self.scanner.scan(packages, &mut self.context)?;
        step.end();
        Ok(added)
    }

    /// Finish configuration
    ///
    /// # Errors
    /// See [`GenericApplicationContext::refresh_with`].
    pub fn refresh(&mut self) -> Result<(), ContextError> {
        self.context.refresh()
    }

    /// Close the context
    pub fn close(&mut self) {
        self.context.close();
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

impl Default for AnnotationConfigApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentCapable for AnnotationConfigApplicationContext {
    fn environment(&self) -> &StandardEnvironment {
        self.context.environment()
    }
}

impl ApplicationContext for AnnotationConfigApplicationContext {
    fn id(&self) -> &str {
        self.context.id()
    }

    fn application_name(&self) -> &str {
        self.context.application_name()
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
