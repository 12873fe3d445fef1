//! `sprout` command line
//!
//! Boots an instrumented context from component types and a catalog, or
//! renders a recorded startup as a step tree.

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use sprout_context::{
    AnnotatedDefinitionReader, AnnotationConfigApplicationContext, ApplicationContext,
    CatalogScanner, ComponentClass, ComponentScanner, EmptyScanner, GenericWebApplicationContext,
    PackageDefinitionScanner, ServletContext,
};
use sprout_metrics::{
    read_recording, ApplicationStartup, FanoutRecorder, FlightRecorderApplicationStartup,
    JsonLinesRecorder, MemoryRecorder, RecordingSettings, StepTree, TracingRecorder, RECORDING_ENV,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("sprout")
        .version(sprout_metrics::VERSION)
        .about("Boot instrumented application contexts and inspect startup recordings")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("boot")
                .about("Register components, scan packages and refresh a context")
                .arg(
                    Arg::new("component")
                        .long("component")
                        .action(ArgAction::Append)
                        .help("Fully qualified component type to register"),
                )
                .arg(
                    Arg::new("configuration")
                        .long("configuration")
                        .action(ArgAction::Append)
                        .help("Fully qualified configuration type to register"),
                )
                .arg(
                    Arg::new("package")
                        .long("package")
                        .action(ArgAction::Append)
                        .help("Base package to scan through the catalog"),
                )
                .arg(
                    Arg::new("catalog")
                        .long("catalog")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON component catalog used for package scans"),
                )
                .arg(
                    Arg::new("recording")
                        .long("recording")
                        .help(format!(
                            "Recording settings, e.g. filename=startup.jsonl,duration=10s \
                             (defaults to ${RECORDING_ENV})"
                        )),
                )
                .arg(
                    Arg::new("web-context-path")
                        .long("web-context-path")
                        .help("Boot a web context served under this path"),
                )
                .arg(
                    Arg::new("trace-steps")
                        .long("trace-steps")
                        .action(ArgAction::SetTrue)
                        .help("Also log every completed step"),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Render a recording as a step tree")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON-lines recording"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the events as a JSON array"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().with_target(true).init();
    } else {
        builder.with_target(false).init();
    }
}

fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("boot", args)) => boot(args),
        Some(("report", args)) => report(args),
        _ => Ok(()),
    }
}

fn values(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn recording_settings(args: &ArgMatches) -> anyhow::Result<Option<RecordingSettings>> {
    match args.get_one::<String>("recording") {
        Some(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("invalid recording settings {raw:?}")),
        None => RecordingSettings::from_env().with_context(|| format!("invalid ${RECORDING_ENV}")),
    }
}

fn boot(args: &ArgMatches) -> anyhow::Result<()> {
    let classes: Vec<ComponentClass> = values(args, "configuration")
        .into_iter()
        .map(ComponentClass::configuration)
        .chain(values(args, "component").into_iter().map(ComponentClass::component))
        .collect();
    let packages = values(args, "package");
    let packages: Vec<&str> = packages.iter().map(String::as_str).collect();

    let scanner: Arc<dyn ComponentScanner> = match args.get_one::<PathBuf>("catalog") {
        Some(path) => Arc::new(
            CatalogScanner::from_json_file(path)
                .with_context(|| format!("cannot load catalog {}", path.display()))?,
        ),
        None => {
            if !packages.is_empty() {
                tracing::warn!("no catalog given: package scans will find nothing");
            }
            Arc::new(EmptyScanner)
        }
    };

    let events = Arc::new(MemoryRecorder::new());
    let mut recorders = FanoutRecorder::new().with(events.clone());
    if args.get_flag("trace-steps") {
        recorders = recorders.with(Arc::new(TracingRecorder));
    }
    let file = match recording_settings(args)? {
        Some(settings) => {
            let recorder = Arc::new(
                JsonLinesRecorder::create(&settings)
                    .with_context(|| format!("cannot create {}", settings.filename.display()))?,
            );
            recorders = recorders.with(recorder.clone());
            Some(recorder)
        }
        None => None,
    };
    let startup: Arc<dyn ApplicationStartup> =
        Arc::new(FlightRecorderApplicationStartup::with_recorder(Arc::new(recorders)));

    match args.get_one::<String>("web-context-path") {
        Some(path) => {
            let mut ctx = GenericWebApplicationContext::with_servlet_context(ServletContext::new(path))
                .with_application_startup(startup);
            let reader = AnnotatedDefinitionReader::new();
            for class in classes {
                reader.register(class, ctx.context_mut())?;
            }
            if !packages.is_empty() {
                PackageDefinitionScanner::new(scanner).scan(&packages, ctx.context_mut())?;
            }
            ctx.refresh().context("web context refresh failed")?;
            print_summary(&ctx, &events);
        }
        None => {
            let mut ctx = AnnotationConfigApplicationContext::with_startup(startup).with_scanner(scanner);
            if !classes.is_empty() {
                ctx.register(classes)?;
            }
            if !packages.is_empty() {
                ctx.scan(&packages)?;
            }
            ctx.refresh().context("context refresh failed")?;
            print_summary(&ctx, &events);
        }
    }

    if let Some(recorder) = file {
        recorder.flush()?;
        println!("recording written to {}", recorder.path().display());
    }
    Ok(())
}

fn print_summary(ctx: &dyn ApplicationContext, events: &MemoryRecorder) {
    let registry = ctx.registry();
    println!("context {} refreshed", ctx.id());
    if !ctx.application_name().is_empty() {
        println!("  application: {}", ctx.application_name());
    }
    println!("  components ({}): {}", registry.len(), registry.names().join(", "));
    let scopes = registry.scope_names();
    if !scopes.is_empty() {
        println!("  scopes: {}", scopes.join(", "));
    }
    println!();
    println!("startup steps:");
    print!("{}", StepTree::build(events.events()).render());
}

fn report(args: &ArgMatches) -> anyhow::Result<()> {
    let path = args
        .get_one::<PathBuf>("file")
        .context("a recording file is required")?;
    let events = read_recording(path).with_context(|| format!("cannot read {}", path.display()))?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }
    let tree = StepTree::build(events);
    if tree.is_empty() {
        println!("no steps recorded");
    } else {
        print!("{}", tree.render());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn boot_collects_repeated_values() {
        let matches = cli()
            .try_get_matches_from([
                "sprout",
                "boot",
                "--component",
                "a.One",
                "--component",
                "a.Two",
                "--package",
                "a",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();

        assert_eq!(values(args, "component"), vec!["a.One", "a.Two"]);
        assert_eq!(values(args, "package"), vec!["a"]);
        assert!(values(args, "configuration").is_empty());
    }

    #[test]
    fn explicit_recording_settings_win() {
        let matches = cli()
            .try_get_matches_from(["sprout", "boot", "--recording", "filename=out.jsonl,duration=5s"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();

        let settings = recording_settings(args).unwrap().unwrap();
        assert_eq!(settings.filename, PathBuf::from("out.jsonl"));
        assert_eq!(settings.duration, Some(std::time::Duration::from_secs(5)));
    }

    #[test]
    fn report_requires_a_file() {
        assert!(cli().try_get_matches_from(["sprout", "report"]).is_err());
    }
}
