//! Annotation-driven context tests
//!
//! Registration, scanning and refresh as recorded through a flight
//! recorder.

use pretty_assertions::assert_eq;
use sprout_context::prelude::*;
use sprout_context::{
    CatalogScanner, ConditionRef, ContextState, OnComponentCondition, StandardEnvironment,
};
use sprout_test_utils::{
    assert_nested, expect_step, recording_startup, sample_catalog, step_names, test_environment,
    write_catalog,
};
use std::sync::Arc;

#[test]
fn test_startup_phases_are_recorded_in_order() {
    let (startup, events) = recording_startup();
    let mut ctx = AnnotationConfigApplicationContext::with_startup(startup);
    ctx.set_environment(StandardEnvironment::empty());

    ctx.register(vec![
        ComponentClass::configuration("com.example.AppConfig"),
        ComponentClass::component("com.example.UserService"),
    ])
    .unwrap();
    ctx.refresh().unwrap();

    assert_eq!(
        step_names(&events),
        vec![
            "spring.context.annotated-bean-reader.create",
            "spring.context.component-classes.register",
            "spring.context.beans.post-process",
            "spring.context.refresh",
        ]
    );
    assert_nested(&events, "spring.context.beans.post-process", "spring.context.refresh");
    assert!(expect_step(&events, "spring.context.refresh").is_top_level());
    assert!(expect_step(&events, "spring.context.component-classes.register").is_top_level());
}

#[test]
fn test_register_tags_type_names() {
    let (startup, events) = recording_startup();
    let mut ctx = AnnotationConfigApplicationContext::with_startup(startup);

    let names = ctx
        .register(vec![
            ComponentClass::configuration("com.example.AppConfig"),
            ComponentClass::component("com.example.UserService"),
        ])
        .unwrap();

    assert_eq!(names, vec!["appConfig", "userService"]);
    assert_eq!(
        expect_step(&events, "spring.context.component-classes.register").tags,
        "[classes=[com.example.AppConfig, com.example.UserService]]"
    );
}

#[test]
fn test_scan_applies_catalog_and_conditions() {
    let (startup, events) = recording_startup();
    let mut ctx = AnnotationConfigApplicationContext::with_startup(startup)
        .with_scanner(Arc::new(sample_catalog()));
    ctx.set_environment(test_environment());

    let added = ctx.scan(&["com.example"]).unwrap();

    assert_eq!(added, 5);
    assert_eq!(
        ctx.registry().names(),
        vec!["appConfig", "userService", "orderService", "cacheManager", "router"]
    );
    assert_eq!(
        expect_step(&events, "spring.context.base-packages.scan").tags,
        "[packages=[com.example]]"
    );
}

#[test]
fn test_scan_with_active_profile() {
    let (startup, _events) = recording_startup();
    let mut ctx = AnnotationConfigApplicationContext::with_startup(startup)
        .with_scanner(Arc::new(sample_catalog()));
    ctx.set_environment(StandardEnvironment::empty().with_active_profiles(["dev"]));

    ctx.scan(&["com.example.dev", "com.example.cache"]).unwrap();

    assert_eq!(ctx.registry().names(), vec!["devConsole"]);
}

#[test]
fn test_rescan_skips_registered_types() {
    let (startup, _events) = recording_startup();
    let mut ctx = AnnotationConfigApplicationContext::with_startup(startup)
        .with_scanner(Arc::new(sample_catalog()));
    ctx.set_environment(test_environment());

    assert_eq!(ctx.scan(&["com.example.service"]).unwrap(), 2);
    assert_eq!(ctx.scan(&["com.example"]).unwrap(), 3);
    assert_eq!(ctx.registry().len(), 5);
}

#[test]
fn test_catalog_loaded_from_file() {
    let (_dir, path) = write_catalog(&sample_catalog());

    let scanner = CatalogScanner::from_json_file(&path).unwrap();

    assert_eq!(scanner, sample_catalog());
}

#[test]
fn test_missing_catalog_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = CatalogScanner::from_json_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ContextError::Io(_)));
}

#[test]
fn test_name_clash_between_types() {
    let (startup, _events) = recording_startup();
    let mut ctx = AnnotationConfigApplicationContext::with_startup(startup);
    ctx.register(vec![ComponentClass::component("com.example.UserService")])
        .unwrap();

    // same type again is accepted
    ctx.register(vec![ComponentClass::component("com.example.UserService")])
        .unwrap();

    let err = ctx
        .register(vec![ComponentClass::component("org.other.UserService")])
        .unwrap_err();
    assert!(matches!(err, ContextError::DuplicateComponent { .. }));
}

#[test]
fn test_register_component_with_explicit_name() {
    let mut ctx = AnnotationConfigApplicationContext::new();
    let name = ctx
        .register_component(Some("users"), ComponentClass::component("com.example.UserService"))
        .unwrap();

    assert_eq!(name.as_deref(), Some("users"));
    assert!(ctx.registry().contains("users"));
}

#[test]
fn test_register_phase_condition_checked_at_refresh() {
    let cache_config = || {
        ComponentClass::configuration("com.example.CacheConfig")
            .when(ConditionRef::phased(OnComponentCondition::present("dataSource")))
    };

    let (startup, _events) = recording_startup();
    let with_source = AnnotationConfigApplicationContext::from_components(
        startup,
        vec![cache_config(), ComponentClass::component("com.example.DataSource")],
    )
    .unwrap();
    assert_eq!(with_source.registry().names(), vec!["cacheConfig", "dataSource"]);

    let (startup, events) = recording_startup();
    let without_source =
        AnnotationConfigApplicationContext::from_components(startup, vec![cache_config()]).unwrap();
    assert!(without_source.registry().is_empty());
    assert_eq!(
        expect_step(&events, "spring.context.beans.post-process").tags,
        r#"[skipped=["cacheConfig"]]"#
    );
    assert_eq!(
        expect_step(&events, "spring.context.refresh").tags,
        "[components=0]"
    );
}

#[test]
fn test_from_packages_refreshes() {
    let (startup, events) = recording_startup();
    let ctx = AnnotationConfigApplicationContext::from_packages(
        startup,
        Arc::new(sample_catalog()),
        &["com.example.web"],
    )
    .unwrap();

    assert_eq!(ctx.context().state(), ContextState::Active);
    assert!(ctx.startup_date().is_some());
    assert_eq!(ctx.registry().names(), vec!["router"]);
    assert_eq!(events.len(), 4);
}

#[test]
fn test_closed_context_rejects_refresh() {
    let mut ctx = AnnotationConfigApplicationContext::new();
    ctx.close();

    let err = ctx.refresh().unwrap_err();
    assert!(err.is_lifecycle());
}
