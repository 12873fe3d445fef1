//! Testing utilities for Sprout workspace
//!
//! Shared test helpers, fixtures, and assertions.

#![allow(missing_docs)]

use sprout_context::{
    CatalogEntry, CatalogScanner, ComponentKind, PropertySource, StandardEnvironment,
};
use sprout_metrics::{ApplicationStartup, FlightRecorderApplicationStartup, MemoryRecorder, StepEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub fn recording_startup() -> (Arc<dyn ApplicationStartup>, Arc<MemoryRecorder>) {
    let events = Arc::new(MemoryRecorder::new());
    let startup = Arc::new(FlightRecorderApplicationStartup::with_recorder(events.clone()));
    (startup, events)
}

pub fn step_names(events: &MemoryRecorder) -> Vec<String> {
    events.events().into_iter().map(|e| e.name).collect()
}

pub fn expect_step(events: &MemoryRecorder, name: &str) -> StepEvent {
    events
        .find(name)
        .unwrap_or_else(|| panic!("no step named {name:?} in {:?}", step_names(events)))
}

pub fn assert_nested(events: &MemoryRecorder, child: &str, parent: &str) {
    let child = expect_step(events, child);
    let parent = expect_step(events, parent);
    assert_eq!(
        child.parent_sequence_id, parent.sequence_id,
        "{} should be nested in {}",
        child.name, parent.name
    );
}

pub fn entry(type_name: &str) -> CatalogEntry {
    CatalogEntry {
        type_name: type_name.to_string(),
        kind: ComponentKind::Component,
        name: None,
        scope: None,
        on_property: None,
        profiles: Vec::new(),
    }
}

pub fn sample_catalog() -> CatalogScanner {
    CatalogScanner::new(vec![
        CatalogEntry {
            kind: ComponentKind::Configuration,
            ..entry("com.example.AppConfig")
        },
        entry("com.example.service.UserService"),
        entry("com.example.service.OrderService"),
        CatalogEntry {
            on_property: Some("feature.cache".to_string()),
            ..entry("com.example.cache.CacheManager")
        },
        CatalogEntry {
            profiles: vec!["dev".to_string()],
            ..entry("com.example.dev.DevConsole")
        },
        CatalogEntry {
            name: Some("router".to_string()),
            ..entry("com.example.web.RequestRouter")
        },
        entry("org.other.Unrelated"),
    ])
}

pub fn test_environment() -> StandardEnvironment {
    StandardEnvironment::empty().with_source(PropertySource::stub("test").with("feature.cache", "true"))
}

pub fn write_catalog(catalog: &CatalogScanner) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, serde_json::to_string_pretty(catalog).unwrap()).unwrap();
    (dir, path)
}
