//! Component definition registry
//!
//! Holds what was registered with a context, in registration order. It
//! does not create or wire instances.

use crate::condition::ConditionRef;
use crate::error::ContextError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Scope assigned when none is given
pub const SINGLETON_SCOPE: &str = "singleton";

/// Role of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Plain component
    #[default]
    Component,
    /// Configuration component that contributes further definitions
    Configuration,
}

/// Type offered for registration, before it has a name
#[derive(Debug, Clone)]
pub struct ComponentClass {
    /// Fully qualified type path (`com.example.UserService` or `app::UserService`)
    pub type_name: String,
    /// Role of the type
    pub kind: ComponentKind,
    /// Explicit component name
    pub name: Option<String>,
    /// Scope name
    pub scope: String,
    /// Registration conditions
    pub conditions: Vec<ConditionRef>,
}

impl ComponentClass {
    /// Plain component type
    #[must_use]
    pub fn component(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: ComponentKind::Component,
            name: None,
            scope: SINGLETON_SCOPE.to_string(),
            conditions: Vec::new(),
        }
    }

    /// Configuration type
    #[must_use]
    pub fn configuration(type_name: impl Into<String>) -> Self {
        Self {
            kind: ComponentKind::Configuration,
            ..Self::component(type_name)
        }
    }

    /// With an explicit name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With a scope other than singleton
    #[must_use]
    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// With a registration condition
    #[must_use]
    pub fn when(mut self, condition: ConditionRef) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Simple type name: the last path segment
    #[must_use]
    pub fn short_name(&self) -> &str {
        let after_module = self
            .type_name
            .rsplit_once("::")
            .map_or(self.type_name.as_str(), |(_, name)| name);
        after_module
            .rsplit_once('.')
            .map_or(after_module, |(_, name)| name)
    }

    /// Attach the resolved name
    #[must_use]
    pub fn into_definition(self, name: String) -> ComponentDefinition {
        ComponentDefinition {
            name,
            type_name: self.type_name,
            kind: self.kind,
            scope: self.scope,
            conditions: self.conditions,
        }
    }
}

/// Named, registered component
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    /// Registered name
    pub name: String,
    /// Fully qualified type path
    pub type_name: String,
    /// Role of the type
    pub kind: ComponentKind,
    /// Scope name
    pub scope: String,
    /// Registration conditions
    pub conditions: Vec<ConditionRef>,
}

impl ComponentDefinition {
    /// Check if this is a configuration component
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind == ComponentKind::Configuration
    }
}

/// Definitions, singleton names and scopes known to a context
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    definitions: IndexMap<String, ComponentDefinition>,
    singletons: IndexMap<String, String>,
    scopes: IndexSet<String>,
    allow_overriding: bool,
}

impl ComponentRegistry {
    /// Create an empty registry that rejects name clashes
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a later definition to replace an earlier one of the same name
    pub fn set_allow_overriding(&mut self, allow: bool) {
        self.allow_overriding = allow;
    }

    /// Register a definition
    ///
    /// Re-registering the same type under the same name is accepted and
    /// replaces the definition.
    ///
    /// # Errors
    /// - [`ContextError::DuplicateComponent`] if the name is taken by another
    ///   type and overriding is disabled
    pub fn register(&mut self, definition: ComponentDefinition) -> Result<(), ContextError> {
        if let Some(existing) = self.definitions.get(&definition.name) {
            if existing.type_name != definition.type_name && !self.allow_overriding {
                return Err(ContextError::DuplicateComponent {
                    name: definition.name,
                    type_name: definition.type_name,
                    existing: existing.type_name.clone(),
                });
            }
            tracing::debug!(name = %definition.name, "overriding component definition");
        }
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Remove a definition, keeping the order of the rest
    pub fn remove(&mut self, name: &str) -> Option<ComponentDefinition> {
        self.definitions.shift_remove(name)
    }

    /// Definition by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(name)
    }

    /// Check if a definition or singleton uses the name
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || self.singletons.contains_key(name)
    }

    /// Check if any definition has the given type
    #[must_use]
    pub fn contains_type(&self, type_name: &str) -> bool {
        self.definitions.values().any(|d| d.type_name == type_name)
    }

    /// Definition names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> impl Iterator<Item = &ComponentDefinition> {
        self.definitions.values()
    }

    /// Number of definitions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if there are no definitions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Register a ready-made singleton by name
    pub fn register_singleton(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.singletons.insert(name.into(), description.into());
    }

    /// Singleton description by name
    #[must_use]
    pub fn singleton(&self, name: &str) -> Option<&str> {
        self.singletons.get(name).map(String::as_str)
    }

    /// Singleton names in registration order
    #[must_use]
    pub fn singleton_names(&self) -> Vec<&str> {
        self.singletons.keys().map(String::as_str).collect()
    }

    /// Register a scope name
    pub fn register_scope(&mut self, scope: impl Into<String>) {
        self.scopes.insert(scope.into());
    }

    /// Registered scope names
    #[must_use]
    pub fn scope_names(&self) -> Vec<&str> {
        self.scopes.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_handles_both_separators() {
        assert_eq!(ComponentClass::component("com.example.UserService").short_name(), "UserService");
        assert_eq!(ComponentClass::component("app::web::Router").short_name(), "Router");
        assert_eq!(ComponentClass::component("Plain").short_name(), "Plain");
    }

    #[test]
    fn rejects_clash_unless_overriding() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(ComponentClass::component("a.First").into_definition("svc".into()))
            .unwrap();

        let clash = ComponentClass::component("b.Second").into_definition("svc".into());
        assert!(matches!(
            registry.register(clash.clone()),
            Err(ContextError::DuplicateComponent { .. })
        ));

        registry.set_allow_overriding(true);
        registry.register(clash).unwrap();
        assert_eq!(registry.get("svc").unwrap().type_name, "b.Second");
    }

    #[test]
    fn remove_keeps_order() {
        let mut registry = ComponentRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .register(ComponentClass::component(format!("x.{name}")).into_definition(name.into()))
                .unwrap();
        }
        registry.remove("b");
        assert_eq!(registry.names(), vec!["a", "c"]);
    }
}
