use std::{path::PathBuf, time::Duration};

use chrono::Utc;
use clap::Parser;
use s3_retain::{
    RetainConfig, RetainError,
    config::{ConfigError, ConfigOverrides, LoggingConfig},
    observability,
    retention::{self, RunFailure},
    storage::ObjectLockStore,
};

/// CLI arguments for s3-retain
#[derive(Parser, Debug)]
#[command(version, about = "Renew S3 Object Lock retention before it lapses", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to the S3_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log which objects would be renewed without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Fraction of the default retention period below which locks are renewed
    #[arg(long, global = true)]
    factor: Option<f64>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Renew expiring locks once and exit (default)
    Run,
    /// Validate configuration and show the renewal window without listing objects
    Check,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            // No logging section to honour yet; report with defaults.
            let _ = observability::init_tracing(&LoggingConfig::default());
            fail(e.into());
        }
    };

    if let Err(e) = observability::init_tracing(&config.logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let store = match build_store(&config).await {
        Ok(store) => store,
        Err(e) => fail(e),
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let result = retention::run_renewal(store.as_ref(), &config).await;
            retention::report(&result);
            std::process::exit(if result.is_ok() { 0 } else { 1 });
        }
        Command::Check => run_check(store.as_ref(), &config).await,
    }
}

/// Load configuration from `--config` or the environment, then apply CLI overrides.
fn load_config(args: &Args) -> Result<RetainConfig, ConfigError> {
    let config = match &args.config {
        Some(path) => RetainConfig::from_file(path)?,
        None => RetainConfig::from_env()?,
    };

    config.with_overrides(ConfigOverrides {
        factor: args.factor,
        dry_run: args.dry_run,
    })
}

#[cfg(feature = "s3-storage")]
async fn build_store(config: &RetainConfig) -> Result<Box<dyn ObjectLockStore>, RetainError> {
    let store = s3_retain::storage::S3LockStore::new(&config.storage)
        .await
        .map_err(|e| RetainError::storage("connect", config.storage.bucket.as_str(), e))?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "s3-storage"))]
async fn build_store(_config: &RetainConfig) -> Result<Box<dyn ObjectLockStore>, RetainError> {
    Err(RetainError::Configuration(
        "the S3 backend requires the 's3-storage' feature".into(),
    ))
}

/// Resolve the bucket policy and print the window a run would use.
async fn run_check(store: &dyn ObjectLockStore, config: &RetainConfig) -> ! {
    match retention::plan_renewal(store, config, Utc::now()).await {
        Ok(plan) => {
            println!("bucket:    {}", config.storage.bucket);
            println!("endpoint:  {}", config.storage.endpoint);
            println!("mode:      {}", plan.policy.mode);
            println!("period:    {} days", plan.policy.period.num_days());
            println!("factor:    {}", config.renewal.factor);
            println!("threshold: {}", plan.window.threshold.to_rfc3339());
            println!("target:    {}", plan.window.target.to_rfc3339());
            println!("dry run:   {}", config.renewal.dry_run);
            std::process::exit(0);
        }
        Err(e) => fail(e),
    }
}

/// Report a failure that happened before any object was processed, then exit.
fn fail(error: RetainError) -> ! {
    retention::report(&Err(RunFailure {
        error,
        renewed: 0,
        total: 0,
        elapsed: Duration::ZERO,
    }));
    std::process::exit(1);
}
