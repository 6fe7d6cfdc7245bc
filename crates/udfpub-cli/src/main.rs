use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use udfpub::bigquery::BigQueryClient;
use udfpub::config::{FileConfig, Settings, SourceArgs, TargetArgs};
use udfpub::dry_run::{DryRunStore, DryRunWarehouse};
use udfpub::storage::GcsClient;
use udfpub_core::{to_persistent, DependencyResolver, Registry, Rewriter};

#[derive(Parser)]
#[command(name = "udfpub")]
#[command(about = "Publish SQL UDFs as persistent BigQuery functions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file (defaults to ./udfpub.toml when present)
    #[arg(short, long, global = true, env = "UDFPUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage libraries and publish functions with their dependencies
    Publish {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// OAuth2 access token for BigQuery and Cloud Storage
        #[arg(long, env = "UDFPUB_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,

        /// Log statements and uploads instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Write a JSON report of the run
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Functions to publish, e.g. udf.mode_last (all when omitted)
        functions: Vec<String>,
    },

    /// Print a function's dependency closure in publish order
    Resolve {
        #[command(flatten)]
        sources: SourceArgs,

        function: String,
    },

    /// Print the statements that would be submitted for a function
    Rewrite {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Include every dependency, in publish order
        #[arg(long)]
        with_dependencies: bool,

        function: String,
    },

    /// List discovered functions
    List {
        #[command(flatten)]
        sources: SourceArgs,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .with_writer(std::io::stderr)
        .init();

    let file = FileConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Publish {
            sources,
            target,
            access_token,
            dry_run,
            report,
            functions,
        } => {
            let settings = Settings::resolve(&file, &sources, &target)?;
            handle_publish(&settings, access_token, dry_run, report, &functions)
        }
        Commands::Resolve { sources, function } => handle_resolve(&sources.resolve(&file), &function),
        Commands::Rewrite {
            sources,
            target,
            with_dependencies,
            function,
        } => {
            let settings = Settings::resolve(&file, &sources, &target)?;
            handle_rewrite(&settings, &function, with_dependencies)
        }
        Commands::List { sources, json } => handle_list(&sources.resolve(&file), json),
    }
}

fn handle_publish(
    settings: &Settings,
    access_token: Option<String>,
    dry_run: bool,
    report: Option<PathBuf>,
    functions: &[String],
) -> Result<()> {
    let show_progress = std::io::stderr().is_terminal();

    let result = if dry_run {
        info!("Dry run: nothing will be sent");
        let mut warehouse = DryRunWarehouse::default();
        let mut store = DryRunStore::default();
        udfpub::publish(
            settings,
            functions,
            &mut warehouse,
            &mut store,
            report.as_deref(),
            show_progress,
        )
    } else {
        let token = access_token
            .context("No access token: pass --access-token or set UDFPUB_ACCESS_TOKEN")?;
        let mut warehouse = BigQueryClient::new(settings.options.project_id.clone(), token.clone())?;
        let mut store = GcsClient::new(token)?;
        udfpub::publish(
            settings,
            functions,
            &mut warehouse,
            &mut store,
            report.as_deref(),
            show_progress,
        )
    };

    let report = result?;
    println!(
        "✓ Published {} functions ({} skipped)",
        report.published.len(),
        report.skipped.len()
    );
    Ok(())
}

fn handle_resolve(source_dirs: &[PathBuf], function: &str) -> Result<()> {
    let registry = Registry::load(source_dirs).context("Failed to load UDF sources")?;
    for name in DependencyResolver::new(&registry).closure(function)? {
        println!("{}", name);
    }
    Ok(())
}

fn handle_rewrite(settings: &Settings, function: &str, with_dependencies: bool) -> Result<()> {
    let registry = Registry::load(&settings.source_dirs).context("Failed to load UDF sources")?;
    let names = if with_dependencies {
        DependencyResolver::new(&registry).closure(function)?
    } else if registry.contains(function) {
        vec![function.to_string()]
    } else {
        anyhow::bail!("Unknown function: {}", function);
    };

    let options = &settings.options;
    let rewriter = Rewriter::new(
        options.project_id.clone(),
        options.bucket.clone(),
        options.path_prefix.clone(),
    );
    for name in names {
        let Some(raw) = registry.get(&name) else {
            continue;
        };
        if options.skip.contains(&raw.relative_path) {
            println!("-- {} skipped ({})\n", name, raw.relative_path);
            continue;
        }
        for definition in &raw.definitions {
            println!("{};\n", to_persistent(&rewriter.rewrite(definition)));
        }
    }
    Ok(())
}

fn handle_list(source_dirs: &[PathBuf], json: bool) -> Result<()> {
    let registry = Registry::load(source_dirs).context("Failed to load UDF sources")?;

    if json {
        let functions: Vec<_> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&functions)?);
        return Ok(());
    }

    for function in registry.iter() {
        let dependencies = function.dependencies();
        println!(
            "{:<40} {:<50} {}",
            function.name,
            function.relative_path,
            dependencies.join(", ")
        );
    }
    Ok(())
}
