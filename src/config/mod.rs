//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//!
//! The signing secret is never written back out: it is skipped on
//! serialization and redacted in `Debug`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SanitizeError};
use crate::pipeline::{Classification, RiskLevel, SanitizeMode};
use crate::token::{DEFAULT_EXPIRATION_HOURS, DEFAULT_VERSION};

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Trust token configuration
    #[serde(default)]
    pub trust_token: TrustTokenConfig,

    /// Classification to risk mapping
    #[serde(default)]
    pub risk: RiskConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SanitizeError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<config dir>/trustgate/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("trustgate").join("config.toml"))
    }

    /// Load the default file if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let base = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        let config = base.merge(Self::from_env());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values are
    /// ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Trust token settings
        if let Some(secret) = lookup("TRUST_TOKEN_SECRET") {
            if !secret.is_empty() {
                config.trust_token.secret = Some(secret);
            }
        }
        if let Some(val) = lookup("TRUST_TOKEN_EXPIRATION_HOURS") {
            match val.parse() {
                Ok(hours) => config.trust_token.expiration_hours = hours,
                Err(_) => tracing::warn!("Ignoring TRUST_TOKEN_EXPIRATION_HOURS={val}"),
            }
        }

        // Pipeline settings
        if let Some(val) = lookup("SANITIZATION_DEFAULT_MODE") {
            match val.parse() {
                Ok(mode) => config.pipeline.default_mode = mode,
                Err(_) => tracing::warn!("Ignoring SANITIZATION_DEFAULT_MODE={val}"),
            }
        }
        if let Some(val) = lookup("SANITIZATION_FINAL_MODE") {
            if val.eq_ignore_ascii_case("false") || val == "0" {
                config.pipeline.default_mode = SanitizeMode::Standard;
            }
        }
        if let Some(val) = lookup("TRUSTGATE_CACHE_CAPACITY") {
            match val.parse() {
                Ok(capacity) => config.pipeline.cache_capacity = capacity,
                Err(_) => tracing::warn!("Ignoring TRUSTGATE_CACHE_CAPACITY={val}"),
            }
        }

        // Risk mappings (JSON object of label -> level)
        if let Some(val) = lookup("SANITIZATION_RISK_MAPPINGS") {
            match serde_json::from_str::<BTreeMap<String, RiskLevel>>(&val) {
                Ok(mappings) => {
                    for (label, level) in mappings {
                        match label.parse::<Classification>() {
                            Ok(classification) => {
                                config
                                    .risk
                                    .mappings
                                    .insert(classification.as_str().to_string(), level);
                            },
                            Err(e) => tracing::warn!("Ignoring risk mapping '{label}': {e}"),
                        }
                    }
                },
                Err(e) => tracing::warn!("Ignoring SANITIZATION_RISK_MAPPINGS: {e}"),
            }
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let pipeline_default = PipelineConfig::default();
        let token_default = TrustTokenConfig::default();

        let mut mappings = self.risk.mappings;
        for (label, level) in other.risk.mappings {
            if RiskConfig::default().mappings.get(&label) != Some(&level) {
                mappings.insert(label, level);
            }
        }

        Self {
            pipeline: PipelineConfig {
                cache_capacity: pick(
                    self.pipeline.cache_capacity,
                    other.pipeline.cache_capacity,
                    pipeline_default.cache_capacity,
                ),
                max_depth: pick(
                    self.pipeline.max_depth,
                    other.pipeline.max_depth,
                    pipeline_default.max_depth,
                ),
                max_input_bytes: pick(
                    self.pipeline.max_input_bytes,
                    other.pipeline.max_input_bytes,
                    pipeline_default.max_input_bytes,
                ),
                default_mode: pick(
                    self.pipeline.default_mode,
                    other.pipeline.default_mode,
                    pipeline_default.default_mode,
                ),
            },
            trust_token: TrustTokenConfig {
                enabled: self.trust_token.enabled && other.trust_token.enabled,
                expiration_hours: pick(
                    self.trust_token.expiration_hours,
                    other.trust_token.expiration_hours,
                    token_default.expiration_hours,
                ),
                version: pick(
                    self.trust_token.version,
                    other.trust_token.version,
                    token_default.version,
                ),
                secret: other.trust_token.secret.or(self.trust_token.secret),
            },
            risk: RiskConfig { mappings },
        }
    }

    /// Check limits and ranges.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_depth == 0 {
            return Err(SanitizeError::Config("pipeline.max_depth must be > 0".into()));
        }
        if self.pipeline.max_input_bytes == 0 {
            return Err(SanitizeError::Config(
                "pipeline.max_input_bytes must be > 0".into(),
            ));
        }
        if self.pipeline.cache_capacity > MAX_CACHE_CAPACITY {
            return Err(SanitizeError::Config(format!(
                "pipeline.cache_capacity exceeds {MAX_CACHE_CAPACITY}"
            )));
        }
        if self.trust_token.expiration_hours == 0 {
            return Err(SanitizeError::Config(
                "trust_token.expiration_hours must be > 0".into(),
            ));
        }
        // Only canonical labels are ever looked up.
        for label in self.risk.mappings.keys() {
            let canonical = label.parse::<Classification>().map(|c| c.as_str());
            if canonical.ok() != Some(label.as_str()) {
                return Err(SanitizeError::Config(format!(
                    "risk.mappings: unknown classification '{label}'"
                )));
            }
        }
        Ok(())
    }
}

/// Take `other` unless it is still the default.
fn pick<T: PartialEq>(base: T, other: T, default: T) -> T {
    if other != default {
        other
    } else {
        base
    }
}

/// Upper bound for the content cache
pub const MAX_CACHE_CAPACITY: usize = 1_000_000;

/// Sanitization pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Content cache capacity (0 disables caching)
    pub cache_capacity: usize,

    /// Maximum nesting depth of structured input
    pub max_depth: usize,

    /// Maximum serialized input size in bytes
    pub max_input_bytes: usize,

    /// Mode recorded when the caller does not choose one
    pub default_mode: SanitizeMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            max_depth: 64,
            max_input_bytes: 10 * 1024 * 1024, // 10 MB
            default_mode: SanitizeMode::Final,
        }
    }
}

/// Trust token configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustTokenConfig {
    /// Mint tokens when callers ask for them
    pub enabled: bool,

    /// Token lifetime in hours
    pub expiration_hours: u32,

    /// Version string stamped into new tokens
    pub version: String,

    /// Signing secret; falls back to `TRUST_TOKEN_SECRET`
    #[serde(skip_serializing)]
    pub secret: Option<String>,
}

impl Default for TrustTokenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiration_hours: DEFAULT_EXPIRATION_HOURS,
            version: DEFAULT_VERSION.to_string(),
            secret: None,
        }
    }
}

impl fmt::Debug for TrustTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustTokenConfig")
            .field("enabled", &self.enabled)
            .field("expiration_hours", &self.expiration_hours)
            .field("version", &self.version)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Maps classification labels to risk levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Label to level
    pub mappings: BTreeMap<String, RiskLevel>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let mappings = [
            ("llm", RiskLevel::High),
            ("non-llm", RiskLevel::Low),
            ("unclear", RiskLevel::Medium),
        ]
        .into_iter()
        .map(|(label, level)| (label.to_string(), level))
        .collect();
        Self { mappings }
    }
}

impl RiskConfig {
    /// Level mapped to `classification`, or `Unset` if none is configured
    pub fn level_for(&self, classification: Classification) -> RiskLevel {
        self.mappings
            .get(classification.as_str())
            .copied()
            .unwrap_or_default()
    }
}
