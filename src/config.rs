//! Configuration management for MetaClean Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Default upload ceiling (100 MiB)
const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Default time a single engine job may run before its worker is killed
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding in-flight upload artifacts
    pub work_dir: PathBuf,
    /// Maximum accepted request body in bytes
    pub max_upload_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker processes in the pool
    pub count: usize,
    /// Program re-executed as `<program> worker`; `None` means the running binary
    pub program: Option<PathBuf>,
    /// Seconds before a stuck job is abandoned and its worker killed
    pub job_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                work_dir: PathBuf::from("."),
                max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            },
            workers: WorkerConfig {
                count: num_cpus::get(),
                program: None,
                job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let count = parse_var("WORKER_COUNT", defaults.workers.count)?;
        if count == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_COUNT",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                work_dir: env::var("WORK_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.work_dir),
                max_upload_size: parse_var("MAX_UPLOAD_SIZE", defaults.storage.max_upload_size)?,
            },
            workers: WorkerConfig {
                count,
                program: env::var("WORKER_PROGRAM").ok().map(PathBuf::from),
                job_timeout_secs: parse_var("JOB_TIMEOUT_SECS", defaults.workers.job_timeout_secs)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
