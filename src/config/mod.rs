//! Configuration for a retention renewal run.
//!
//! A run is configured either from environment variables (the usual way to
//! schedule the job from cron or a Kubernetes `CronJob`) or from a TOML file
//! with support for environment variable interpolation using `${VAR_NAME}`
//! syntax.
//!
//! # Environment
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `S3_BUCKET` | yes | |
//! | `S3_ENDPOINT` | yes | |
//! | `S3_ACCESS_KEY` | yes | |
//! | `S3_ACCESS_SECRET` | yes | |
//! | `S3_RETAIN_FACTOR` | no | `0.5` |
//! | `S3_REGION` | no | `us-east-1` |
//! | `S3_FORCE_PATH_STYLE` | no | `true` |
//! | `S3_RETAIN_DRY_RUN` | no | `false` |
//!
//! # Example
//!
//! ```toml
//! [storage]
//! bucket = "archive"
//! endpoint = "https://minio.internal:9000"
//! access_key_id = "${S3_ACCESS_KEY}"
//! secret_access_key = "${S3_ACCESS_SECRET}"
//!
//! [renewal]
//! factor = 0.5
//! ```

mod observability;
mod renewal;
mod retry;
mod storage;

use std::{path::Path, str::FromStr, sync::LazyLock};

pub use observability::*;
use regex::Regex;
pub use renewal::*;
pub use retry::*;
use serde::{Deserialize, Serialize};
pub use storage::*;

pub const ENV_BUCKET: &str = "S3_BUCKET";
pub const ENV_ENDPOINT: &str = "S3_ENDPOINT";
pub const ENV_ACCESS_KEY: &str = "S3_ACCESS_KEY";
pub const ENV_ACCESS_SECRET: &str = "S3_ACCESS_SECRET";
pub const ENV_FACTOR: &str = "S3_RETAIN_FACTOR";
pub const ENV_REGION: &str = "S3_REGION";
pub const ENV_FORCE_PATH_STYLE: &str = "S3_FORCE_PATH_STYLE";
pub const ENV_DRY_RUN: &str = "S3_RETAIN_DRY_RUN";

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"));

/// Root configuration for a renewal run.
///
/// Built once at startup and passed by reference into the resolver,
/// enumerator and renewal engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetainConfig {
    /// Target bucket and connection credentials.
    pub storage: S3StorageConfig,

    /// Threshold factor, page size and dry-run switch.
    #[serde(default)]
    pub renewal: RenewalConfig,

    /// Backoff for idempotent storage reads.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Console logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings given on the command line, applied over the loaded configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverrides {
    pub factor: Option<f64>,
    pub dry_run: bool,
}

impl RetainConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error. The result is not validated yet;
    /// see [`RetainConfig::with_overrides`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Build configuration from the `S3_*` environment variables.
    ///
    /// Like [`RetainConfig::from_file`], values are parsed but not validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage = S3StorageConfig {
            bucket: required_env(ENV_BUCKET)?,
            endpoint: required_env(ENV_ENDPOINT)?,
            access_key_id: required_env(ENV_ACCESS_KEY)?,
            secret_access_key: required_env(ENV_ACCESS_SECRET)?,
            region: std::env::var(ENV_REGION).unwrap_or_else(|_| default_region()),
            force_path_style: parsed_env(ENV_FORCE_PATH_STYLE)?.unwrap_or(true),
        };

        let renewal = RenewalConfig {
            factor: parsed_env(ENV_FACTOR)?.unwrap_or_else(default_factor),
            dry_run: parsed_env(ENV_DRY_RUN)?.unwrap_or(false),
            ..Default::default()
        };

        Ok(Self {
            storage,
            renewal,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// Apply command-line overrides, then validate the result.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(factor) = overrides.factor {
            self.renewal.factor = factor;
        }
        if overrides.dry_run {
            self.renewal.dry_run = true;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate().map_err(ConfigError::Validation)?;
        self.renewal.validate().map_err(ConfigError::Validation)?;
        self.retry.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

impl FromStr for RetainConfig {
    type Err = ConfigError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let expanded = expand_env_vars(contents)?;
        toml::from_str(&expanded).map_err(ConfigError::Parse)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidEnvVar {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarNotFound(name.to_string()))
}

fn parsed_env<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    parsed.map(Some).map_err(|e| ConfigError::InvalidEnvVar {
        name: name.to_string(),
        value,
        reason: e.to_string(),
    })
}

/// Expand `${VAR}` references, ignoring anything after a `#` on the line.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR_PATTERN.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
