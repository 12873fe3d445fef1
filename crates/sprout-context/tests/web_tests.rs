//! Web context tests

use pretty_assertions::assert_eq;
use sprout_context::prelude::*;
use sprout_context::web::{CONTEXT_PARAMETERS_SINGLETON, SERVLET_CONTEXT_SINGLETON};
use sprout_context::ServletContext;
use sprout_context::env::{SERVLET_CONFIG_SOURCE, SERVLET_CONTEXT_SOURCE};
use sprout_test_utils::{assert_nested, recording_startup, step_names};

fn shop() -> ServletContext {
    ServletContext::new("/shop")
        .with_init_parameter("shop.currency", "EUR")
        .with_init_parameter("shop.region", "eu-west")
}

#[test]
fn test_servlet_environment_has_placeholder_sources() {
    let ctx = GenericWebApplicationContext::new();
    let names = ctx.environment().source_names();

    assert_eq!(&names[..2], &[SERVLET_CONFIG_SOURCE, SERVLET_CONTEXT_SOURCE]);
    assert!(ctx.environment().source(SERVLET_CONTEXT_SOURCE).unwrap().is_empty());
}

#[test]
fn test_refresh_exposes_init_parameters() {
    let mut ctx = GenericWebApplicationContext::with_servlet_context(shop());
    assert_eq!(ctx.environment().get_property("shop.currency"), None);

    ctx.refresh().unwrap();

    assert_eq!(ctx.environment().get_property("shop.currency"), Some("EUR"));
    assert_eq!(ctx.environment().source(SERVLET_CONTEXT_SOURCE).unwrap().len(), 2);
}

#[test]
fn test_refresh_registers_web_scopes_and_singletons() {
    let mut ctx = GenericWebApplicationContext::with_servlet_context(shop());
    ctx.refresh().unwrap();

    assert_eq!(ctx.registry().scope_names(), vec!["request", "session", "application"]);
    assert_eq!(
        ctx.registry().singleton_names(),
        vec![SERVLET_CONTEXT_SINGLETON, CONTEXT_PARAMETERS_SINGLETON]
    );
}

#[test]
fn test_refresh_without_servlet_context() {
    let mut ctx = GenericWebApplicationContext::new();
    ctx.refresh().unwrap();

    assert_eq!(ctx.registry().scope_names(), vec!["request", "session"]);
    assert!(ctx.registry().singleton_names().is_empty());
    assert_eq!(ctx.application_name(), "");
}

#[test]
fn test_web_refresh_is_recorded() {
    let (startup, events) = recording_startup();
    let mut ctx = GenericWebApplicationContext::with_servlet_context(shop())
        .with_application_startup(startup);
    ctx.register_definition(
        ComponentClass::component("com.example.web.Router").into_definition("router".into()),
    )
    .unwrap();

    ctx.refresh().unwrap();

    assert_eq!(
        step_names(&events),
        vec!["spring.context.beans.post-process", "spring.context.refresh"]
    );
    assert_nested(&events, "spring.context.beans.post-process", "spring.context.refresh");
    assert_eq!(events.find("spring.context.refresh").unwrap().tags, "[components=1]");
}

#[test]
fn test_servlet_context_can_be_set_later() {
    let mut ctx = GenericWebApplicationContext::new();
    assert!(ctx.resource_by_path("/").is_err());

    ctx.set_servlet_context(Some(shop()));
    assert_eq!(ctx.application_name(), "/shop");
    assert_eq!(ctx.resource_by_path("/").unwrap().path(), "/");

    ctx.set_servlet_context(None);
    assert!(matches!(ctx.resource_by_path("/"), Err(ContextError::NoServletContext)));
}

#[test]
fn test_resource_existence() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
    let ctx = GenericWebApplicationContext::with_servlet_context(
        ServletContext::new("").with_resource_base(dir.path()),
    );

    assert!(ctx.resource_by_path("/index.html").unwrap().exists());
    assert!(!ctx.resource_by_path("/missing.html").unwrap().exists());
}
