//! Server configuration, read once at startup

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use clap::{Args, ValueEnum};
use thiserror::Error;
use tracing::warn;

/// Length in bytes of generated secrets
const SECRET_BYTES: usize = 32;

/// Longest accepted retention window (ten years)
pub const MAX_RETENTION_HOURS: u32 = 87_600;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppEnv {
    Development,
    Production,
    /// CSRF checks disabled
    Testing,
}

/// Settings shared by the command line and the environment
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Deployment environment
    #[arg(long, env = "APP_ENV", value_enum, default_value = "development")]
    pub environment: AppEnv,

    /// Directory holding the `.docx` templates
    #[arg(long, env = "TEMPLATE_FOLDER", default_value = "doc_templates")]
    pub template_dir: PathBuf,

    /// Directory for generated documents
    #[arg(long, env = "TEMP_FOLDER", default_value = "temp")]
    pub temp_dir: PathBuf,

    /// How long generated documents are kept
    #[arg(long, env = "TEMP_FILE_MAX_AGE_HOURS", default_value = "24")]
    pub retention_hours: u32,

    /// Seconds between background sweeps of expired documents (0 disables)
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "3600")]
    pub sweep_interval_secs: u64,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_CONTENT_LENGTH", default_value = "16777216")]
    pub max_content_length: usize,

    /// Secret for signing CSRF tokens
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Maximum CSRF token age in seconds; tokens never expire when unset
    #[arg(long, env = "CSRF_TIME_LIMIT_SECS")]
    pub csrf_time_limit_secs: Option<u64>,

    /// Delete a document as soon as it has been downloaded
    #[arg(long, env = "PURGE_AFTER_DOWNLOAD")]
    pub purge_after_download: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SECRET_KEY must be set in production (run `writgen-server generate-secret`)")]
    MissingSecret,

    #[error("SECRET_KEY must be at least 16 characters")]
    WeakSecret,

    #[error("TEMP_FILE_MAX_AGE_HOURS must be greater than zero")]
    ZeroRetention,

    #[error("TEMP_FILE_MAX_AGE_HOURS must be at most {}", MAX_RETENTION_HOURS)]
    RetentionTooLong,

    #[error("could not gather randomness for a secret: {0}")]
    Random(String),
}

/// Validated server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: AppEnv,
    pub template_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub retention: Duration,
    /// `None` when background sweeping is disabled
    pub sweep_interval: Option<StdDuration>,
    pub max_content_length: usize,
    pub secret_key: Vec<u8>,
    pub csrf_enabled: bool,
    pub csrf_time_limit: Option<Duration>,
    pub purge_after_download: bool,
    pub verbose: bool,
}

impl ServerConfig {
    pub fn from_args(args: ConfigArgs) -> Result<Self, ConfigError> {
        if args.retention_hours == 0 {
            return Err(ConfigError::ZeroRetention);
        }
        if args.retention_hours > MAX_RETENTION_HOURS {
            return Err(ConfigError::RetentionTooLong);
        }

        let secret_key = match args.secret_key.filter(|s| !s.trim().is_empty()) {
            Some(secret) if secret.len() < 16 => return Err(ConfigError::WeakSecret),
            Some(secret) => secret.into_bytes(),
            None if args.environment == AppEnv::Production => {
                return Err(ConfigError::MissingSecret)
            }
            None => {
                warn!("SECRET_KEY not set; using a random key, CSRF tokens will not survive a restart");
                generate_secret()?.into_bytes()
            }
        };

        Ok(Self {
            host: args.host,
            port: args.port,
            environment: args.environment,
            template_dir: args.template_dir,
            temp_dir: args.temp_dir,
            retention: Duration::hours(i64::from(args.retention_hours)),
            sweep_interval: (args.sweep_interval_secs > 0)
                .then(|| StdDuration::from_secs(args.sweep_interval_secs)),
            max_content_length: args.max_content_length,
            secret_key,
            csrf_enabled: args.environment != AppEnv::Testing,
            csrf_time_limit: args
                .csrf_time_limit_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(Duration::try_seconds),
            purge_after_download: args.purge_after_download,
            verbose: args.verbose,
        })
    }

    /// Debug logging in development or with `--verbose`
    pub fn debug_logging(&self) -> bool {
        self.verbose || self.environment == AppEnv::Development
    }
}

/// A fresh random secret as 64 hex characters
pub fn generate_secret() -> Result<String, ConfigError> {
    let mut bytes = [0u8; SECRET_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| ConfigError::Random(e.to_string()))?;
    Ok(hex::encode(bytes))
}
