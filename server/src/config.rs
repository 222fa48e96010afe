//! Configuration management for the server.

use pantry_transfer::DEFAULT_PATCH_CONCURRENCY;
use std::env;

/// Default request body limit for imports (256 MiB).
const DEFAULT_MAX_IMPORT_BYTES: usize = 256 * 1024 * 1024;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Bearer token granting the data-export capability
    pub export_token: Option<String>,
    /// Patches in flight at once during import
    pub patch_concurrency: usize,
    /// Largest accepted import body
    pub max_import_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let export_token = lookup("EXPORT_TOKEN").filter(|t| !t.is_empty());

        let patch_concurrency = match lookup("PATCH_CONCURRENCY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(ConfigError::InvalidPatchConcurrency),
            },
            None => DEFAULT_PATCH_CONCURRENCY,
        };

        let max_import_bytes = match lookup("MAX_IMPORT_BYTES") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidMaxImportBytes)?,
            None => DEFAULT_MAX_IMPORT_BYTES,
        };

        Ok(Self {
            host,
            port,
            database_url,
            export_token,
            patch_concurrency,
            max_import_bytes,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("PATCH_CONCURRENCY must be a positive integer")]
    InvalidPatchConcurrency,

    #[error("Invalid MAX_IMPORT_BYTES value")]
    InvalidMaxImportBytes,
}
