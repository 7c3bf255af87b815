//! Feedscope - package source resolution and health diagnostics
//!
//! Usage:
//!   feedscope sources                 # Configured sources
//!   feedscope probe <source>          # Feed type and available capabilities
//!   feedscope versions <source> <id>  # Versions of a package
//!   feedscope deps <source> <id>      # Dependency info of a package
//!   feedscope list <source>           # Packages of a local folder feed
//!   feedscope health                  # Source health metrics

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedscope_core::context::AppContext;
use feedscope_core::diagnostics::{DiagnosticMessage, HealthMetrics, SourceDiagnostics};
use feedscope_core::poller::{ActionEventSink, HealthPoller, TracingLogger};
use feedscope_core::prelude::*;
use feedscope_core::registry::DefaultProviderOptions;

#[derive(Parser)]
#[command(name = "feedscope")]
#[command(about = "Package source resolution and health diagnostics", long_about = None)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured package sources
    Sources,

    /// Detect the feed type of a source and the capabilities it supports
    Probe {
        /// Source name from feedscope.toml
        source: String,
    },

    /// List every version of a package
    Versions { source: String, id: String },

    /// Show dependency info of a package
    Deps {
        source: String,
        id: String,
        /// Only this version (all versions otherwise)
        #[arg(long)]
        version: Option<Version>,
        /// Target framework moniker
        #[arg(long, default_value = "any")]
        framework: String,
    },

    /// List packages of a local folder source
    List { source: String },

    /// Exercise every active source and report health metrics
    Health {
        /// Package id looked up on each source
        #[arg(long)]
        package: Option<String>,
        /// Keep polling for warnings for this many seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show issues (non-zero exit if problems)
    Quiet,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedscope=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ctx = app_context(cli.project)?;
    let format = cli.format;

    match cli.command {
        Commands::Sources => run_sources(&ctx, format),
        Commands::Probe { source } => run_probe(&ctx, &source, format).await,
        Commands::Versions { source, id } => run_versions(&ctx, &source, &id, format).await,
        Commands::Deps {
            source,
            id,
            version,
            framework,
        } => run_deps(&ctx, &source, &id, version, &Framework::new(framework), format).await,
        Commands::List { source } => run_list(&ctx, &source, format).await,
        Commands::Health { package, watch } => {
            run_health(&ctx, package.as_deref(), watch.map(Duration::from_secs), format).await
        }
    }
}

fn app_context(project: Option<PathBuf>) -> Result<AppContext> {
    let home_dir = dirs::home_dir().context("Could not determine home directory")?;
    let project_root = match project {
        Some(path) => path,
        None => std::env::current_dir().context("Could not determine current directory")?,
    };
    Ok(AppContext::new(home_dir, project_root))
}

/// Prints warnings reported by the health poller.
struct ConsoleSink;

impl ActionEventSink for ConsoleSink {
    fn on_warning(&self, message: &str) -> Result<()> {
        eprintln!("⚠ {message}");
        Ok(())
    }

    fn on_error(&self, message: &str) -> Result<()> {
        eprintln!("✗ {message}");
        Ok(())
    }
}

fn find_source(ctx: &AppContext, name: &str) -> Result<Arc<PackageSource>> {
    let sources = ctx.active_sources()?;
    sources
        .into_iter()
        .find(|s| s.name() == name)
        .with_context(|| format!("No enabled source named '{name}'"))
}

fn repository_for(ctx: &AppContext, name: &str) -> Result<(RepositoryProvider, Arc<SourceRepository>)> {
    let source = find_source(ctx, name)?;
    let provider = ctx.repository_provider(DefaultProviderOptions::default())?;
    let repository = provider.create_repository(source);
    Ok((provider, repository))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_sources(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let config = ctx.load_config()?;
    let sources = config.package_sources(ctx.project_root(), ctx.home_dir())?;

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = sources
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "name": s.name(),
                        "transport": s.transport(),
                        "enabled": s.is_enabled(),
                        "address": s.display_address(),
                    })
                })
                .collect();
            print_json(&entries)
        }
        OutputFormat::Quiet => Ok(()),
        OutputFormat::Table => {
            if sources.is_empty() {
                println!("No package sources configured.");
                println!("Add a [source.<name>] table to feedscope.toml to get started.");
                return Ok(());
            }
            println!("{:<20} {:<8} {:<8} Address", "Name", "Type", "Enabled");
            println!("{}", "-".repeat(70));
            for s in &sources {
                let transport = match s.transport() {
                    SourceTransport::Local => "local",
                    SourceTransport::Http => "http",
                };
                println!(
                    "{:<20} {:<8} {:<8} {}",
                    s.name(),
                    transport,
                    if s.is_enabled() { "yes" } else { "no" },
                    s.display_address()
                );
            }
            Ok(())
        }
    }
}

async fn run_probe(ctx: &AppContext, name: &str, format: OutputFormat) -> Result<()> {
    let (_provider, repository) = repository_for(ctx, name)?;
    let token = CancellationToken::new();

    let feed_type = repository.feed_type(&token).await?;
    let capabilities = [
        (
            DependencyInfoCapability::NAME,
            repository.try_get_resource::<DependencyInfoCapability>(&token).await?.is_some(),
        ),
        (
            FindPackageByIdCapability::NAME,
            repository.try_get_resource::<FindPackageByIdCapability>(&token).await?.is_some(),
        ),
        (
            FindLocalPackagesCapability::NAME,
            repository.try_get_resource::<FindLocalPackagesCapability>(&token).await?.is_some(),
        ),
        (
            HttpSourceCapability::NAME,
            repository.try_get_resource::<HttpSourceCapability>(&token).await?.is_some(),
        ),
        (
            ServiceIndexCapability::NAME,
            repository.try_get_resource::<ServiceIndexCapability>(&token).await?.is_some(),
        ),
    ];

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "source": name,
            "feed_type": feed_type.as_str(),
            "capabilities": capabilities
                .iter()
                .filter(|(_, available)| *available)
                .map(|(capability, _)| *capability)
                .collect::<Vec<_>>(),
        })),
        OutputFormat::Quiet => Ok(()),
        OutputFormat::Table => {
            println!("Source: {name}");
            println!("Feed type: {feed_type}");
            println!();
            for (capability, available) in capabilities {
                let marker = if available { "✓" } else { "-" };
                println!("  {marker} {capability}");
            }
            Ok(())
        }
    }
}

async fn run_versions(ctx: &AppContext, name: &str, id: &str, format: OutputFormat) -> Result<()> {
    let (_provider, repository) = repository_for(ctx, name)?;
    let token = CancellationToken::new();
    let resource = repository
        .get_resource::<FindPackageByIdCapability>(&token)
        .await?;
    let versions = resource.get_all_versions(id, &token).await?;

    match format {
        OutputFormat::Json => print_json(&versions),
        OutputFormat::Quiet => Ok(()),
        OutputFormat::Table => {
            if versions.is_empty() {
                println!("No versions of '{id}' found on '{name}'.");
            }
            for version in versions {
                println!("{id} {version}");
            }
            Ok(())
        }
    }
}

async fn run_deps(
    ctx: &AppContext,
    name: &str,
    id: &str,
    version: Option<Version>,
    framework: &Framework,
    format: OutputFormat,
) -> Result<()> {
    let (_provider, repository) = repository_for(ctx, name)?;
    let token = CancellationToken::new();
    let resource = repository
        .get_resource::<DependencyInfoCapability>(&token)
        .await?;

    let infos = match version {
        Some(version) => {
            let identity = PackageIdentity::new(id, version);
            match resource.resolve_package(&identity, framework, &token).await? {
                Some(info) => vec![info],
                None => bail!("Package '{identity}' not found on '{name}'"),
            }
        }
        None => resource.resolve_packages(id, framework, &token).await?,
    };

    match format {
        OutputFormat::Json => print_json(&infos),
        OutputFormat::Quiet => Ok(()),
        OutputFormat::Table => {
            for info in &infos {
                let listed = if info.listed { "" } else { " (unlisted)" };
                println!("{}{listed}", info.identity);
                if info.dependencies.is_empty() {
                    println!("  (no dependencies for {framework})");
                }
                for dependency in &info.dependencies {
                    println!("  → {} {}", dependency.id, dependency.range);
                }
            }
            Ok(())
        }
    }
}

async fn run_list(ctx: &AppContext, name: &str, format: OutputFormat) -> Result<()> {
    let (_provider, repository) = repository_for(ctx, name)?;
    let token = CancellationToken::new();
    let resource = repository
        .get_resource::<FindLocalPackagesCapability>(&token)
        .await?;
    let packages = resource.get_packages(&token).await?;

    match format {
        OutputFormat::Json => print_json(&packages),
        OutputFormat::Quiet => Ok(()),
        OutputFormat::Table => {
            if packages.is_empty() {
                println!("No packages found in '{name}'.");
                return Ok(());
            }
            println!("{:<40} {:<16} Path", "Id", "Version");
            println!("{}", "-".repeat(80));
            for package in &packages {
                println!(
                    "{:<40} {:<16} {}",
                    package.identity.id,
                    package.identity.version.to_string(),
                    package.path.display()
                );
            }
            Ok(())
        }
    }
}

async fn run_health(
    ctx: &AppContext,
    package: Option<&str>,
    watch: Option<Duration>,
    format: OutputFormat,
) -> Result<()> {
    let sources = ctx.active_sources()?;
    let provider = ctx.repository_provider(DefaultProviderOptions::default())?;
    let repositories: Vec<_> = sources
        .into_iter()
        .map(|s| provider.create_repository(s))
        .collect();
    let hub = provider
        .hub()
        .cloned()
        .context("Repository provider has no diagnostics hub")?;
    let stores: Vec<Arc<SourceDiagnostics>> = repositories
        .iter()
        .filter_map(|r| r.diagnostics())
        .collect();

    let poller = HealthPoller::new(stores, Arc::new(ConsoleSink), Arc::new(TracingLogger));
    poller.start()?;

    let token = CancellationToken::new();
    for repository in &repositories {
        exercise(repository, package, &token).await;
    }
    if let Some(duration) = watch {
        tokio::time::sleep(duration).await;
    }
    poller.stop().await?;

    let now = chrono::Utc::now();
    let report: Vec<(String, HealthMetrics, Vec<DiagnosticMessage>)> = hub
        .all()
        .iter()
        .map(|d| {
            (
                d.source_name().to_string(),
                d.compute_metrics(now),
                d.diagnostic_messages(now),
            )
        })
        .collect();

    let unhealthy = report.iter().any(|(_, _, messages)| !messages.is_empty());
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = report
                .iter()
                .map(|(name, metrics, messages)| {
                    serde_json::json!({
                        "source": name,
                        "metrics": metrics,
                        "messages": messages,
                    })
                })
                .collect();
            print_json(&entries)?;
        }
        OutputFormat::Quiet => {
            for (_, _, messages) in &report {
                for message in messages {
                    println!("{}", message.details);
                }
            }
            if unhealthy {
                std::process::exit(1);
            }
        }
        OutputFormat::Table => {
            println!(
                "{:<20} {:>6} {:>6} {:>6} {:>9} {:>9} {:>6} {:>6}",
                "Source", "Total", "OK", "Failed", "Cancelled", "Timed out", "Slow", "Unresp"
            );
            println!("{}", "-".repeat(80));
            for (name, m, _) in &report {
                println!(
                    "{:<20} {:>6} {:>6} {:>6} {:>9} {:>9} {:>6} {:>6}",
                    name,
                    m.total,
                    m.successful,
                    m.failed,
                    m.cancelled,
                    m.timed_out,
                    m.slow,
                    m.unresponsive
                );
            }
            for (_, _, messages) in &report {
                for message in messages {
                    println!("⚠ {}", message.details);
                }
            }
            if !unhealthy {
                println!();
                println!("All sources healthy.");
            }
        }
    }
    Ok(())
}

/// Issue a few traced requests so the diagnostics have something to report.
/// Failures are expected here and only logged.
async fn exercise(repository: &SourceRepository, package: Option<&str>, token: &CancellationToken) {
    let name = repository.source().name();
    if let Err(e) = repository.feed_type(token).await {
        tracing::warn!(source = name, error = %e, "feed type probe failed");
        return;
    }

    if repository.source().is_local() {
        match repository.try_get_resource::<FindLocalPackagesCapability>(token).await {
            Ok(Some(resource)) => {
                if let Err(e) = resource.get_packages(token).await {
                    tracing::warn!(source = name, error = %e, "listing packages failed");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(source = name, error = %e, "local package lookup unavailable"),
        }
    }

    let Some(id) = package else {
        return;
    };
    match repository.try_get_resource::<FindPackageByIdCapability>(token).await {
        Ok(Some(resource)) => {
            if let Err(e) = resource.get_all_versions(id, token).await {
                tracing::warn!(source = name, package = id, error = %e, "version lookup failed");
            }
        }
        Ok(None) => tracing::debug!(source = name, "no package-by-id lookup for source"),
        Err(e) => tracing::warn!(source = name, error = %e, "package-by-id lookup unavailable"),
    }
}
