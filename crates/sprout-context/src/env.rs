//! Environment abstraction
//!
//! An environment is an ordered list of named property sources (first
//! source wins on lookup) plus the active and default profiles.

use crate::error::ContextError;
use std::collections::BTreeMap;

/// Property naming the active profiles, comma separated
pub const ACTIVE_PROFILES_PROPERTY: &str = "sprout.profiles.active";

/// Profile active when no other profile is
pub const DEFAULT_PROFILE: &str = "default";

/// Source name of the process environment snapshot
pub const SYSTEM_ENVIRONMENT_SOURCE: &str = "systemEnvironment";

/// Source name reserved for servlet config init parameters
pub const SERVLET_CONFIG_SOURCE: &str = "servletConfigInitParams";

/// Source name reserved for servlet context init parameters
pub const SERVLET_CONTEXT_SOURCE: &str = "servletContextInitParams";

/// Component exposing an environment
pub trait EnvironmentCapable {
    /// Environment associated with this component
    fn environment(&self) -> &StandardEnvironment;
}

/// Named set of properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySource {
    name: String,
    properties: BTreeMap<String, String>,
}

impl PropertySource {
    /// Create from a property map
    #[must_use]
    pub fn new(name: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Placeholder to be replaced once the real values are known
    #[must_use]
    pub fn stub(name: impl Into<String>) -> Self {
        Self::new(name, BTreeMap::new())
    }

    /// With an extra property
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Source name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a property
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Number of properties
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check if the source holds no properties
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Property sources and profiles of a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardEnvironment {
    sources: Vec<PropertySource>,
    active_profiles: Option<Vec<String>>,
    default_profiles: Vec<String>,
    required_properties: Vec<String>,
}

impl StandardEnvironment {
    /// Environment backed by a snapshot of the process environment
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    #[must_use]
    pub fn new() -> Self {
        let system: BTreeMap<String, String> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self::empty().with_source(PropertySource::new(SYSTEM_ENVIRONMENT_SOURCE, system))
    }

    /// Environment with no property sources
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            active_profiles: None,
            default_profiles: vec![DEFAULT_PROFILE.to_string()],
            required_properties: Vec::new(),
        }
    }

    /// Standard environment with servlet placeholder sources in front
    #[must_use]
    pub fn servlet() -> Self {
        let mut env = Self::new();
        env.add_first(PropertySource::stub(SERVLET_CONTEXT_SOURCE));
        env.add_first(PropertySource::stub(SERVLET_CONFIG_SOURCE));
        env
    }

    /// With an extra lowest-precedence source
    #[must_use]
    pub fn with_source(mut self, source: PropertySource) -> Self {
        self.add_last(source);
        self
    }

    /// With explicit active profiles
    #[must_use]
    pub fn with_active_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_active_profiles(profiles);
        self
    }

    /// Add a source with highest precedence, replacing one of the same name
    pub fn add_first(&mut self, source: PropertySource) {
        self.remove(source.name());
        self.sources.insert(0, source);
    }

    /// Add a source with lowest precedence, replacing one of the same name
    pub fn add_last(&mut self, source: PropertySource) {
        self.remove(source.name());
        self.sources.push(source);
    }

    /// Replace the source named like `source` in place
    ///
    /// Returns `false` (and adds nothing) when no such source exists.
    pub fn replace(&mut self, source: PropertySource) -> bool {
        match self.sources.iter_mut().find(|s| s.name == source.name) {
            Some(slot) => {
                *slot = source;
                true
            }
            None => false,
        }
    }

    /// Remove a source by name
    pub fn remove(&mut self, name: &str) -> Option<PropertySource> {
        let index = self.sources.iter().position(|s| s.name == name)?;
        Some(self.sources.remove(index))
    }

    /// Source by name
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&PropertySource> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Source names in precedence order
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(PropertySource::name).collect()
    }

    /// Look up a property in precedence order
    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.sources.iter().find_map(|s| s.get(key))
    }

    /// Check if a property resolves
    #[inline]
    #[must_use]
    pub fn contains_property(&self, key: &str) -> bool {
        self.get_property(key).is_some()
    }

    /// Set the active profiles explicitly
    pub fn set_active_profiles<I, S>(&mut self, profiles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_profiles = Some(profiles.into_iter().map(Into::into).collect());
    }

    /// Set the fallback profiles
    pub fn set_default_profiles<I, S>(&mut self, profiles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_profiles = profiles.into_iter().map(Into::into).collect();
    }

    /// Active profiles: explicit ones, else [`ACTIVE_PROFILES_PROPERTY`]
    #[must_use]
    pub fn active_profiles(&self) -> Vec<String> {
        if let Some(profiles) = &self.active_profiles {
            return profiles.clone();
        }
        self.get_property(ACTIVE_PROFILES_PROPERTY)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fallback profiles
    #[inline]
    #[must_use]
    pub fn default_profiles(&self) -> &[String] {
        &self.default_profiles
    }

    /// Check a profile expression (`name` or `!name`)
    #[must_use]
    pub fn accepts_profile(&self, expression: &str) -> bool {
        if let Some(negated) = expression.strip_prefix('!') {
            return !self.accepts_profile(negated);
        }
        let active = self.active_profiles();
        if active.is_empty() {
            self.default_profiles.iter().any(|p| p == expression)
        } else {
            active.iter().any(|p| p == expression)
        }
    }

    /// Mark properties that must resolve before refresh completes
    pub fn set_required_properties<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_properties = keys.into_iter().map(Into::into).collect();
    }

    /// Check that every required property resolves
    ///
    /// # Errors
    /// - [`ContextError::MissingRequiredProperties`] listing the missing keys
    pub fn validate_required_properties(&self) -> Result<(), ContextError> {
        let missing: Vec<String> = self
            .required_properties
            .iter()
            .filter(|key| !self.contains_property(key))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ContextError::MissingRequiredProperties(missing))
        }
    }

    /// Append the parent's sources and profiles that this one lacks
    pub fn merge(&mut self, parent: &StandardEnvironment) {
        for source in &parent.sources {
            if self.source(source.name()).is_none() {
                self.sources.push(source.clone());
            }
        }
        if let (Some(own), Some(inherited)) = (&mut self.active_profiles, &parent.active_profiles) {
            for profile in inherited {
                if !own.contains(profile) {
                    own.push(profile.clone());
                }
            }
        }
        for profile in &parent.default_profiles {
            if !self.default_profiles.contains(profile) {
                self.default_profiles.push(profile.clone());
            }
        }
    }
}

impl Default for StandardEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layered() -> StandardEnvironment {
        StandardEnvironment::empty()
            .with_source(PropertySource::stub("first").with("shared", "first").with("a", "1"))
            .with_source(PropertySource::stub("second").with("shared", "second").with("b", "2"))
    }

    #[test]
    fn first_source_wins() {
        let env = layered();
        assert_eq!(env.get_property("shared"), Some("first"));
        assert_eq!(env.get_property("b"), Some("2"));
        assert_eq!(env.get_property("missing"), None);
    }

    #[test]
    fn add_first_takes_precedence_and_replaces_by_name() {
        let mut env = layered();
        env.add_first(PropertySource::stub("second").with("shared", "override"));

        assert_eq!(env.source_names(), vec!["second", "first"]);
        assert_eq!(env.get_property("shared"), Some("override"));
    }

    #[test]
    fn servlet_environment_orders_placeholders_first() {
        let env = StandardEnvironment::servlet();
        assert_eq!(
            &env.source_names()[..3],
            &[SERVLET_CONFIG_SOURCE, SERVLET_CONTEXT_SOURCE, SYSTEM_ENVIRONMENT_SOURCE]
        );
    }

    #[test]
    fn profiles_fall_back_to_default() {
        let env = StandardEnvironment::empty();
        assert!(env.accepts_profile(DEFAULT_PROFILE));
        assert!(env.accepts_profile("!prod"));

        let env = env.with_active_profiles(["prod"]);
        assert!(env.accepts_profile("prod"));
        assert!(!env.accepts_profile(DEFAULT_PROFILE));
    }

    #[test]
    fn profiles_from_property() {
        let env = StandardEnvironment::empty().with_source(
            PropertySource::stub("app").with(ACTIVE_PROFILES_PROPERTY, "dev, metrics"),
        );
        assert_eq!(env.active_profiles(), vec!["dev", "metrics"]);
        assert!(env.accepts_profile("metrics"));
    }

    #[test]
    fn required_properties_are_reported() {
        let mut env = layered();
        env.set_required_properties(["a", "db.url", "cache.size"]);

        let err = env.validate_required_properties().unwrap_err();
        assert!(matches!(
            err,
            ContextError::MissingRequiredProperties(ref keys) if keys == &["db.url", "cache.size"]
        ));
    }

    #[test]
    fn merge_appends_missing_parent_sources() {
        let mut child = StandardEnvironment::empty()
            .with_source(PropertySource::stub("first").with("shared", "child"));
        child.merge(&layered());

        assert_eq!(child.source_names(), vec!["first", "second"]);
        assert_eq!(child.get_property("shared"), Some("child"));
        assert_eq!(child.get_property("b"), Some("2"));
    }

    #[cfg(unix)]
    #[test]
    fn system_snapshot_skips_non_unicode_variables() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        std::env::set_var("SPROUT_ENV_NON_UNICODE", OsString::from_vec(vec![0x66, 0xff, 0x6f]));
        std::env::set_var("SPROUT_ENV_UNICODE", "fine");
        let env = StandardEnvironment::new();
        std::env::remove_var("SPROUT_ENV_NON_UNICODE");
        std::env::remove_var("SPROUT_ENV_UNICODE");

        assert_eq!(env.get_property("SPROUT_ENV_NON_UNICODE"), None);
        assert_eq!(env.get_property("SPROUT_ENV_UNICODE"), Some("fine"));
        assert_eq!(env.source_names(), vec![SYSTEM_ENVIRONMENT_SOURCE]);
    }
}
