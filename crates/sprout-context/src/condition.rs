//! Conditional registration
//!
//! A [`Condition`] decides whether a component is registered. A
//! [`ConfigurationCondition`] additionally names the [`ConfigurationPhase`]
//! in which it must be evaluated:
//! - `ParseConfiguration`: while configuration components are registered;
//!   a non-match keeps the configuration component out entirely
//! - `RegisterBean`: once all configuration components are known, during
//!   refresh; it never prevents configuration parsing

use crate::env::StandardEnvironment;
use crate::registry::{ComponentDefinition, ComponentKind, ComponentRegistry};
use std::fmt::Debug;
use std::sync::Arc;

/// Phase in which a condition is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationPhase {
    /// While configuration components are parsed
    ParseConfiguration,
    /// While regular components are registered
    RegisterBean,
}

/// What a condition can inspect
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Context environment
    pub environment: &'a StandardEnvironment,
    /// Definitions registered so far
    pub registry: &'a ComponentRegistry,
}

/// Registration predicate
pub trait Condition: Send + Sync + Debug {
    /// Whether `definition` should be registered
    fn matches(&self, context: &ConditionContext<'_>, definition: &ComponentDefinition) -> bool;
}

/// Condition bound to a configuration phase
pub trait ConfigurationCondition: Condition {
    /// Phase in which the condition is evaluated
    fn configuration_phase(&self) -> ConfigurationPhase;
}

/// Condition attached to a component
#[derive(Debug, Clone)]
pub enum ConditionRef {
    /// Evaluated in every phase
    Unphased(Arc<dyn Condition>),
    /// Evaluated only in its own phase
    Phased(Arc<dyn ConfigurationCondition>),
}

impl ConditionRef {
    /// Wrap a plain condition
    #[must_use]
    pub fn new(condition: impl Condition + 'static) -> Self {
        Self::Unphased(Arc::new(condition))
    }

    /// Wrap a phase-bound condition
    #[must_use]
    pub fn phased(condition: impl ConfigurationCondition + 'static) -> Self {
        Self::Phased(Arc::new(condition))
    }

    /// Phase this condition is restricted to
    #[must_use]
    pub fn required_phase(&self) -> Option<ConfigurationPhase> {
        match self {
            Self::Unphased(_) => None,
            Self::Phased(condition) => Some(condition.configuration_phase()),
        }
    }

    /// Evaluate the condition
    #[must_use]
    pub fn matches(&self, context: &ConditionContext<'_>, definition: &ComponentDefinition) -> bool {
        match self {
            Self::Unphased(condition) => condition.matches(context, definition),
            Self::Phased(condition) => condition.matches(context, definition),
        }
    }
}

/// Applies component conditions for a phase
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Whether `definition` should be skipped
    ///
    /// Without an explicit phase, configuration components are evaluated
    /// for `ParseConfiguration` and everything else for `RegisterBean`.
    /// Unphased conditions apply in every phase; phased ones only in their
    /// own. Any applicable non-matching condition skips the component.
    #[must_use]
    pub fn should_skip(
        &self,
        context: &ConditionContext<'_>,
        definition: &ComponentDefinition,
        phase: Option<ConfigurationPhase>,
    ) -> bool {
        if definition.conditions.is_empty() {
            return false;
        }
        let phase = phase.unwrap_or(match definition.kind {
            ComponentKind::Configuration => ConfigurationPhase::ParseConfiguration,
            ComponentKind::Component => ConfigurationPhase::RegisterBean,
        });
        definition.conditions.iter().any(|condition| {
            let applies = condition.required_phase().map_or(true, |required| required == phase);
            applies && !condition.matches(context, definition)
        })
    }
}

/// Matches when a property resolves (optionally to a given value)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnPropertyCondition {
    name: String,
    having_value: Option<String>,
    match_if_missing: bool,
}

impl OnPropertyCondition {
    /// Match when `name` resolves to anything other than `false`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            having_value: None,
            match_if_missing: false,
        }
    }

    /// Match only this value (case-insensitive)
    #[must_use]
    pub fn having_value(mut self, value: impl Into<String>) -> Self {
        self.having_value = Some(value.into());
        self
    }

    /// Match when the property is absent
    #[must_use]
    pub fn match_if_missing(mut self, matches: bool) -> Self {
        self.match_if_missing = matches;
        self
    }
}

impl Condition for OnPropertyCondition {
    fn matches(&self, context: &ConditionContext<'_>, _definition: &ComponentDefinition) -> bool {
        match context.environment.get_property(&self.name) {
            None => self.match_if_missing,
            Some(value) => match &self.having_value {
                Some(expected) => value.eq_ignore_ascii_case(expected),
                None => !value.eq_ignore_ascii_case("false"),
            },
        }
    }
}

/// Matches when any of the profile expressions is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnProfileCondition {
    profiles: Vec<String>,
}

impl OnProfileCondition {
    /// Match any of `profiles` (`name` or `!name`)
    #[must_use]
    pub fn new<I, S>(profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            profiles: profiles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Condition for OnProfileCondition {
    fn matches(&self, context: &ConditionContext<'_>, _definition: &ComponentDefinition) -> bool {
        self.profiles
            .iter()
            .any(|profile| context.environment.accepts_profile(profile))
    }
}

/// Matches on the presence (or absence) of another component
///
/// Only meaningful once every configuration component is known, so it is
/// evaluated in the `RegisterBean` phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnComponentCondition {
    name: String,
    present: bool,
}

impl OnComponentCondition {
    /// Match when a component called `name` is registered
    #[must_use]
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            present: true,
        }
    }

    /// Match when no component called `name` is registered
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            present: false,
        }
    }
}

impl Condition for OnComponentCondition {
    fn matches(&self, context: &ConditionContext<'_>, _definition: &ComponentDefinition) -> bool {
        context.registry.contains(&self.name) == self.present
    }
}

impl ConfigurationCondition for OnComponentCondition {
    fn configuration_phase(&self) -> ConfigurationPhase {
        ConfigurationPhase::RegisterBean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::PropertySource;
    use crate::registry::ComponentClass;

    fn env() -> StandardEnvironment {
        StandardEnvironment::empty()
            .with_source(
                PropertySource::stub("app")
                    .with("feature.cache", "true")
                    .with("feature.audit", "false"),
            )
            .with_active_profiles(["dev"])
    }

    fn skip(def: &ComponentDefinition, phase: Option<ConfigurationPhase>) -> bool {
        let env = env();
        let registry = ComponentRegistry::new();
        let ctx = ConditionContext {
            environment: &env,
            registry: &registry,
        };
        ConditionEvaluator.should_skip(&ctx, def, phase)
    }

    #[test]
    fn unconditional_components_are_kept() {
        let def = ComponentClass::component("a.Plain").into_definition("plain".into());
        assert!(!skip(&def, None));
    }

    #[test]
    fn property_conditions() {
        let cache = ComponentClass::component("a.Cache")
            .when(ConditionRef::new(OnPropertyCondition::new("feature.cache")))
            .into_definition("cache".into());
        let audit = ComponentClass::component("a.Audit")
            .when(ConditionRef::new(OnPropertyCondition::new("feature.audit")))
            .into_definition("audit".into());
        let metrics = ComponentClass::component("a.Metrics")
            .when(ConditionRef::new(
                OnPropertyCondition::new("feature.metrics").match_if_missing(true),
            ))
            .into_definition("metrics".into());

        assert!(!skip(&cache, None));
        assert!(skip(&audit, None));
        assert!(!skip(&metrics, None));
    }

    #[test]
    fn profile_conditions() {
        let dev = ComponentClass::component("a.DevTools")
            .when(ConditionRef::new(OnProfileCondition::new(["dev"])))
            .into_definition("devTools".into());
        let prod = ComponentClass::component("a.ProdTools")
            .when(ConditionRef::new(OnProfileCondition::new(["prod"])))
            .into_definition("prodTools".into());

        assert!(!skip(&dev, None));
        assert!(skip(&prod, None));
    }

    #[test]
    fn register_phase_condition_does_not_block_parsing() {
        let config = ComponentClass::configuration("a.CacheConfig")
            .when(ConditionRef::phased(OnComponentCondition::present("dataSource")))
            .into_definition("cacheConfig".into());

        // default phase for configuration components is ParseConfiguration
        assert!(!skip(&config, None));
        assert!(skip(&config, Some(ConfigurationPhase::RegisterBean)));
    }

    #[test]
    fn register_phase_condition_applies_to_plain_components_immediately() {
        let component = ComponentClass::component("a.Fallback")
            .when(ConditionRef::phased(OnComponentCondition::missing("primary")))
            .into_definition("fallback".into());
        assert!(!skip(&component, None));
    }
}
