#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    dead_code
)]

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use sweeper::builtin;
use sweeper::events::Payload;
use sweeper::plugins::{load_mods, DiagnosticLevel, ModCatalog, UnitKind};
use sweeper::{Config, SimulatedHost, Sweeper};

/// `sweeper` - mod runtime: discovery, phased lifecycle, causal trigger bus.
#[derive(Parser, Debug)]
#[command(name = "sweeper")]
#[command(version)]
#[command(about = "Discover mods, run their lifecycle and wire their triggers.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.sweeper/config.toml if it exists)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra mod directory, scanned after the configured ones (repeatable)
    #[arg(long = "mod-dir", global = true)]
    mod_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot every mod, drain the host loop and print a summary
    Run {
        /// Raise a native host event after boot: `NAME` or `NAME={"json":"object"}` (repeatable)
        #[arg(long)]
        emit: Vec<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Discover and construct mods without running their lifecycle
    List,
}

fn catalog_for(config: &Config) -> ModCatalog {
    if config.mods.builtins {
        builtin::catalog()
    } else {
        let mut catalog = ModCatalog::new();
        builtin::register_builtins(&mut catalog);
        catalog
    }
}

/// Split `NAME` or `NAME=JSON` into a native event name and payload.
fn parse_emit(raw: &str) -> Result<(String, Payload)> {
    let Some((name, body)) = raw.split_once('=') else {
        return Ok((raw.to_string(), Payload::new()));
    };
    if name.is_empty() {
        bail!("`--emit {raw}` has no event name");
    }
    match serde_json::from_str::<serde_json::Value>(body)
        .with_context(|| format!("`--emit {raw}`: payload is not valid JSON"))?
    {
        serde_json::Value::Object(map) => Ok((name.to_string(), map)),
        _ => bail!("`--emit {raw}`: payload must be a JSON object"),
    }
}

fn run(config: &Config, extra_dirs: &[PathBuf], emit: &[String], json: bool) -> Result<()> {
    let events = emit
        .iter()
        .map(|raw| parse_emit(raw))
        .collect::<Result<Vec<_>>>()?;

    let host = Rc::new(SimulatedHost::with_drain_limit(
        config.host.max_callbacks_per_drain,
    ));
    let sweeper = Sweeper::boot(config, extra_dirs, &catalog_for(config), host.clone());
    let mut drained = host.run_pending();

    for (name, payload) in &events {
        let handlers = host.emit(name, payload);
        info!(native_event = %name, handlers, "emitted");
        drained += host.run_pending();
    }

    if json {
        let summary = serde_json::json!({
            "mods": sweeper.registry().names(),
            "failures": sweeper.lifecycle().failures,
            "bindings": sweeper.engine().bindings(),
            "diagnostics": sweeper.diagnostics(),
            "deferred_callbacks": drained,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Mods ({}):", sweeper.registry().len());
    for name in sweeper.registry().names() {
        let source = sweeper.registry().source(&name).unwrap_or("?");
        println!("  {name:<24} {source}");
    }

    let failures = &sweeper.lifecycle().failures;
    if !failures.is_empty() {
        println!();
        println!("Removed during lifecycle ({}):", failures.len());
        for failure in failures {
            println!("  {} [{}]: {}", failure.mod_name, failure.phase, failure.error);
        }
    }

    let bindings = sweeper.engine().bindings();
    if !bindings.is_empty() {
        println!();
        println!("Listeners ({}):", bindings.len());
        for binding in bindings {
            println!(
                "  {} -> {}.{}",
                binding.listener, binding.target, binding.trigger
            );
        }
    }

    let warnings = sweeper
        .diagnostics()
        .iter()
        .filter(|d| d.level != DiagnosticLevel::Info)
        .count();
    println!();
    println!(
        "{} unit(s), {warnings} warning(s), {drained} deferred callback(s) run",
        sweeper.units().len()
    );
    Ok(())
}

fn list(config: &Config, extra_dirs: &[PathBuf]) {
    let mut roots = config.mod_dirs();
    roots.extend(extra_dirs.iter().cloned());
    let report = load_mods(&roots, &config.discovery_rules(), &catalog_for(config));

    println!("Units ({}):", report.units.len());
    for unit in &report.units {
        let kind = match unit.kind {
            UnitKind::File => "file",
            UnitKind::Package => "package",
        };
        println!("  {:<20} {kind:<8} {}", unit.name, unit.path.display());
    }

    println!();
    println!("Mods ({}):", report.registry.len());
    for name in report.registry.names() {
        println!("  {name:<24} {}", report.registry.source(&name).unwrap_or("?"));
    }

    if !report.diagnostics.is_empty() {
        println!();
        println!("Diagnostics ({}):", report.diagnostics.len());
        for diag in &report.diagnostics {
            let level = match diag.level {
                DiagnosticLevel::Info => "info",
                DiagnosticLevel::Warn => "warn",
                DiagnosticLevel::Error => "error",
            };
            let subject = diag
                .mod_name
                .as_deref()
                .or(diag.source.as_deref())
                .unwrap_or("-");
            println!("  [{level}] {subject}: {}", diag.message);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { emit, json } => run(&config, &cli.mod_dirs, &emit, json),
        Commands::List => {
            list(&config, &cli.mod_dirs);
            Ok(())
        }
    }
}
