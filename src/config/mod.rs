//! Runtime configuration: TOML settings overridden by environment variables.

mod conflict;
pub(crate) mod helpers;

use std::path::{Path, PathBuf};

pub use conflict::{AuditConfig, ConflictConfig};

use crate::config::helpers::parse_string_env;
use crate::error::ConfigError;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    LibSql,
    Memory,
}

impl DatabaseBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "libsql" | "sqlite" => Ok(Self::LibSql),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "CONFLICT_DB_BACKEND".to_string(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LibSql => "libsql",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub libsql_path: PathBuf,
}

impl DatabaseConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend = DatabaseBackend::parse(&parse_string_env(
            "CONFLICT_DB_BACKEND",
            settings.database.backend.clone(),
        )?)?;
        let path = parse_string_env("CONFLICT_DB_PATH", settings.database.libsql_path.clone())?;
        if backend == DatabaseBackend::LibSql && path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CONFLICT_DB_PATH".to_string(),
                message: "database path must not be empty".to_string(),
            });
        }
        Ok(Self {
            backend,
            libsql_path: PathBuf::from(path.trim()),
        })
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub conflicts: ConflictConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Resolve every section from settings plus environment overrides.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(settings)?,
            conflicts: ConflictConfig::resolve(settings)?,
            audit: AuditConfig::resolve(settings)?,
        })
    }

    /// Load `.env`, then the optional settings file, then resolve.
    pub fn load(settings_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!("Failed to load .env file: {}", e);
        }
        let settings = match settings_path {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        Self::resolve(&settings)
    }
}
