//! Zentinel resource configuration CLI.
//!
//! Loads a resource configuration file and reports, for each document, which
//! configurations target the document fragment and each element.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zentinel_resource_config::{
    ExecutionContext, FilterDriver, FilterMode, Profile, ResourceConfigFile, EXAMPLE_CONFIG,
};

#[derive(Parser, Debug)]
#[command(name = "zentinel-resource-config")]
#[command(
    author,
    version,
    about = "Resolve resource configurations against XML documents"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, env = "ZENTINEL_RESOURCE_CONFIG")]
    config: Option<PathBuf>,

    /// Base profile of the execution context
    #[arg(short, long, default_value = "default")]
    profile: String,

    /// Extra sub-profile (repeatable, `name;q=0.5` for weighted)
    #[arg(long = "sub-profile")]
    sub_profiles: Vec<String>,

    /// Front end (defaults to settings.default_mode)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Context attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, String)>,

    /// Template directory path (overrides settings.template_dir)
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,

    /// Documents to filter (stdin when none)
    documents: Vec<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Tree,
    Stream,
}

impl From<Mode> for FilterMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Tree => FilterMode::Tree,
            Mode::Stream => FilterMode::Stream,
        }
    }
}

fn parse_attr(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if args.example_config {
        println!("{}", EXAMPLE_CONFIG);
        return Ok(());
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ResourceConfigFile::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => ResourceConfigFile::default(),
    };
    if let Some(template_dir) = &args.template_dir {
        config.settings.template_dir = Some(template_dir.clone());
    }

    let driver = FilterDriver::from_config(&config).context("Invalid resource configuration")?;

    if args.validate {
        info!(configs = driver.store().len(), "Configuration is valid");
        return Ok(());
    }

    let mut profile_set = driver.store().profile_set(&args.profile);
    for sub_profile in &args.sub_profiles {
        profile_set.add_profile(Profile::parse(sub_profile));
    }
    let attributes: HashMap<String, String> = args.attrs.iter().cloned().collect();
    let mode = args.mode.map(FilterMode::from);
    let driver = Arc::new(driver);

    if args.documents.is_empty() {
        let mut xml = String::new();
        std::io::stdin()
            .read_to_string(&mut xml)
            .context("Failed to read document from stdin")?;
        let ctx = ExecutionContext::new(profile_set)
            .with_attributes(attributes)
            .with_document("-");
        let report = driver.filter(&xml, ctx, mode)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut tasks = Vec::with_capacity(args.documents.len());
    for path in args.documents.clone() {
        let driver = Arc::clone(&driver);
        let ctx = ExecutionContext::new(profile_set.clone())
            .with_attributes(attributes.clone())
            .with_document(path.display().to_string());
        tasks.push(tokio::task::spawn_blocking(move || -> Result<String> {
            let xml = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read document: {}", path.display()))?;
            let report = driver
                .filter(&xml, ctx, mode)
                .with_context(|| format!("Failed to filter document: {}", path.display()))?;
            Ok(serde_json::to_string_pretty(&report)?)
        }));
    }

    let mut failed = 0;
    for task in tasks {
        match task.await.context("Filter task panicked")? {
            Ok(report) => println!("{}", report),
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "Document failed");
                failed += 1;
            }
        }
    }

    let stats = driver.stats().snapshot();
    info!(
        documents = stats.documents_total,
        failed = stats.documents_failed,
        elements = stats.elements_visited,
        matches = stats.matches_total,
        handler_errors = stats.handler_errors,
        "Done"
    );

    if failed > 0 {
        bail!("{} of {} documents failed", failed, args.documents.len());
    }
    Ok(())
}
