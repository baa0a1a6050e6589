use std::path::{Component, PathBuf};
use std::time::Duration;

use crate::config::helpers::{
    optional_env, parse_bool_env, parse_csv, parse_number_env, parse_string_env,
};
use crate::conflicts::messages::Locale;
use crate::conflicts::model::EntityCategory;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictConfig {
    pub locale: Locale,
    /// Upper bound on one corpus lookup; exceeding it is a lookup failure.
    pub lookup_timeout: Duration,
    /// Distinct name-only matches for one identity that trigger an ambiguity warning.
    pub ambiguity_threshold: usize,
    /// Affiliated categories whose match against a direct party is a
    /// related-entity conflict. Anything else (by default only
    /// `related_company`) yields a cross-entity conflict.
    pub principal_categories: Vec<EntityCategory>,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            lookup_timeout: Duration::from_millis(5_000),
            ambiguity_threshold: 2,
            principal_categories: EntityCategory::ALL
                .into_iter()
                .filter(|c| *c != EntityCategory::RelatedCompany)
                .collect(),
        }
    }
}

/// Audit log controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub hash_chain: bool,
}

fn parse_categories(key: &str, raw: &[String]) -> Result<Vec<EntityCategory>, ConfigError> {
    let mut categories = Vec::with_capacity(raw.len());
    for value in raw {
        let category =
            EntityCategory::from_db_value(value).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("unknown entity category '{value}'"),
            })?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(categories)
}

fn validate_audit_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "CONFLICT_AUDIT_PATH".to_string(),
            message: "audit log path must not be empty".to_string(),
        });
    }

    let raw_path = PathBuf::from(trimmed);
    if raw_path.is_absolute() {
        return Err(ConfigError::InvalidValue {
            key: "CONFLICT_AUDIT_PATH".to_string(),
            message: "audit log path must be relative to the working directory".to_string(),
        });
    }

    let mut normalized = PathBuf::new();
    for component in raw_path.components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ConfigError::InvalidValue {
                    key: "CONFLICT_AUDIT_PATH".to_string(),
                    message: "audit log path must not contain '..' components".to_string(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ConfigError::InvalidValue {
                    key: "CONFLICT_AUDIT_PATH".to_string(),
                    message: "audit log path must be relative to the working directory"
                        .to_string(),
                });
            }
        }
    }

    if normalized.components().count() < 2 || !normalized.starts_with("logs") {
        return Err(ConfigError::InvalidValue {
            key: "CONFLICT_AUDIT_PATH".to_string(),
            message: "audit log path must be under 'logs/' and include a filename".to_string(),
        });
    }

    Ok(normalized)
}

impl ConflictConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let locale_raw = parse_string_env("CONFLICT_LOCALE", settings.conflicts.locale.clone())?;
        let locale = Locale::parse(&locale_raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "CONFLICT_LOCALE".to_string(),
            message: format!("unsupported locale '{locale_raw}'"),
        })?;

        let timeout_ms = parse_number_env(
            "CONFLICT_LOOKUP_TIMEOUT_MS",
            settings.conflicts.lookup_timeout_ms,
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CONFLICT_LOOKUP_TIMEOUT_MS".to_string(),
                message: "lookup timeout must be positive".to_string(),
            });
        }

        let ambiguity_threshold = parse_number_env(
            "CONFLICT_AMBIGUITY_THRESHOLD",
            settings.conflicts.ambiguity_threshold,
        )?;
        if ambiguity_threshold < 2 {
            return Err(ConfigError::InvalidValue {
                key: "CONFLICT_AMBIGUITY_THRESHOLD".to_string(),
                message: "ambiguity needs at least two matches".to_string(),
            });
        }

        let principal_raw = match optional_env("CONFLICT_PRINCIPAL_CATEGORIES")? {
            Some(raw) => parse_csv(&raw),
            None => settings
                .conflicts
                .principal_categories
                .iter()
                .map(|c| c.trim().to_ascii_lowercase())
                .collect(),
        };

        Ok(Self {
            locale,
            lookup_timeout: Duration::from_millis(timeout_ms),
            ambiguity_threshold,
            principal_categories: parse_categories(
                "CONFLICT_PRINCIPAL_CATEGORIES",
                &principal_raw,
            )?,
        })
    }
}

impl AuditConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool_env("CONFLICT_AUDIT_ENABLED", settings.audit.enabled)?,
            path: {
                let raw = parse_string_env("CONFLICT_AUDIT_PATH", settings.audit.path.clone())?;
                validate_audit_path(&raw)?
            },
            hash_chain: parse_bool_env("CONFLICT_AUDIT_HASH_CHAIN", settings.audit.hash_chain)?,
        })
    }
}
