use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use clean_architecture_boilerplate::api::create_router;
use clean_architecture_boilerplate::app::{AppState, HealthMonitorJob, JobConfig, spawn_job};
use clean_architecture_boilerplate::config::{self, AppConfig};
use clean_architecture_boilerplate::domain::{
    AppError, ConfigError, Manifest, Notifier, PackageManager, Severity,
};
use clean_architecture_boilerplate::infra::{
    LogNotifier, LoggingConfig, PoolConfig, PostgresClient, TelegramNotifier, init_logging,
    init_metrics_handle,
};

#[derive(Debug, Parser)]
#[command(name = "boilerplate", version, about = "Backend service and manifest tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Inspect a pyproject.toml dependency manifest
    #[command(subcommand)]
    Manifest(ManifestCommand),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Apply the migrations in this directory before serving
    #[arg(long, value_name = "DIR")]
    migrations: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ManifestCommand {
    /// Parse and validate a manifest
    Check {
        path: PathBuf,
    },
    /// Print the environment setup commands for a manifest
    Setup {
        path: PathBuf,
        /// Package manager; detected from the manifest when omitted
        #[arg(long)]
        manager: Option<PackageManager>,
        /// Dependency group or extra to install in addition to the main set
        #[arg(long = "group", value_name = "GROUP")]
        groups: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            serve(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Manifest(ManifestCommand::Check { path }) => check_manifest(&path),
        Command::Manifest(ManifestCommand::Setup {
            path,
            manager,
            groups,
        }) => {
            print_setup(&path, manager, &groups)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    config::load_dotenv();
    let app_config: &AppConfig = config::app_config()?;

    let _log_guards = init_logging(&LoggingConfig::from(app_config))?;
    let metrics = init_metrics_handle();
    if metrics.is_none() {
        warn!("Metrics recorder could not be installed; /metrics is disabled");
    }

    let postgres = PostgresClient::connect(config::postgres_settings()?, PoolConfig::default())
        .await
        .context("connecting to PostgreSQL")?;
    if let Some(dir) = &args.migrations {
        postgres.run_migrations(dir).await?;
    }

    let notifier = build_notifier()?;
    let state = AppState::new(Arc::new(postgres.clone()), notifier).with_metrics(metrics);

    let monitor = app_config.health_monitor.then(|| {
        let job = Arc::new(HealthMonitorJob::new(Arc::clone(&state.service)));
        let config = JobConfig {
            interval: app_config.health_interval(),
            enabled: true,
        };
        spawn_job(job, config)
    });

    let router = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(app_config.bind_addr)
        .await
        .with_context(|| format!("binding {}", app_config.bind_addr))?;
    info!(addr = %app_config.bind_addr, "Server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((handle, shutdown_tx)) = monitor {
        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "Health monitor task failed");
        }
    }
    postgres.close().await;
    info!("Server stopped");
    Ok(())
}

/// Telegram when its settings are present, otherwise log-only.
fn build_notifier() -> Result<Arc<dyn Notifier>> {
    match config::telegram_settings() {
        Ok(settings) => Ok(Arc::new(TelegramNotifier::with_defaults(settings)?)),
        Err(AppError::Config(ConfigError::MissingEnvVar(var))) => {
            warn!(missing = %var, "Telegram is not configured; notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
        Err(e) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn check_manifest(path: &Path) -> Result<ExitCode> {
    let manifest = Manifest::load(path)?;
    let issues = manifest.validate();
    for issue in &issues {
        println!("{issue}");
    }

    let errors = issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .count();
    println!(
        "{}: {} requirement(s), {} error(s), {} warning(s)",
        path.display(),
        manifest.requirement_count(),
        errors,
        issues.len() - errors
    );

    Ok(if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_setup(path: &Path, manager: Option<PackageManager>, groups: &[String]) -> Result<()> {
    let manifest = Manifest::load(path)?;
    let manager = manager
        .or(manifest.manager)
        .context("cannot detect the package manager; pass --manager")?;

    for command in manifest.setup_commands(manager, groups)? {
        println!("{command}");
    }
    Ok(())
}
