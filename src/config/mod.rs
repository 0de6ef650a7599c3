//! Configuration management for the guard policy.
//!
//! - [`GuardPolicy`] – the aggregate policy with per-component sections
//! - [`PolicyBuilder`] – builder for constructing policies from files, env
//!   vars, and overrides
//! - [`ConfigError`] – everything that can go wrong while loading
//!
//! ## Configuration hierarchy
//!
//! Policies are resolved in the following order (later wins):
//!
//! 1. Compiled defaults (the tuned veterinary-text constants)
//! 2. Config file (`pawguard.toml`, `.yaml`, or `.json`)
//! 3. Environment variables (`PAWGUARD_*`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use pawguard::config::PolicyBuilder;
//!
//! let policy = PolicyBuilder::new()
//!     .with_file("pawguard.toml")?
//!     .with_env()
//!     .build()?;
//!
//! assert!(policy.enabled);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

use crate::abuse::rate_limit::RateLimitConfig;
use crate::input::classifier::ClassifierConfig;
use crate::input::sanitizer::SanitizerConfig;
use crate::prompt::response::ScrubberConfig;

/// Errors that can occur during policy configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {source}")]
    ParseError {
        /// Format that failed to parse (YAML, TOML, JSON)
        format: String,
        /// Underlying parse error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Unsupported or unrecognised configuration file extension
    #[error("Unsupported config file format: {message}")]
    UnsupportedFormat {
        /// Description of the problem
        message: String,
    },

    /// Configuration validation failed
    #[error("Policy validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Environment variable parsing error
    #[error("Failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable key
        key: String,
        /// Error message
        message: String,
    },
}

/// The aggregate guard policy.
///
/// Constructed once at startup and passed (inside a
/// [`Guard`](crate::guard::Guard)) by reference into every request handler.
/// All tunables — rule sets, heuristic weights, level thresholds, field
/// ceilings, window parameters — are data here, not hard-coded invariants.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct GuardPolicy {
    /// Policy version for compatibility tracking
    #[serde(default = "default_version")]
    #[validate(length(min = 1))]
    pub version: String,

    /// Global enable/disable flag.  When disabled, classification gating
    /// and rate limiting are bypassed; sanitization still applies.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Injection classifier tunables.
    #[serde(default)]
    #[validate(nested)]
    pub classifier: ClassifierConfig,

    /// Field sanitization ceilings.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Response scrubbing markers and refusal message.
    #[serde(default)]
    pub response: ScrubberConfig,

    /// Rate-limit window parameters.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_enabled() -> bool {
    true
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            version: default_version(),
            enabled: default_enabled(),
            classifier: ClassifierConfig::default(),
            sanitizer: SanitizerConfig::default(),
            response: ScrubberConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Builder for constructing guard policies from multiple sources
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    base: GuardPolicy,
    file_path: Option<PathBuf>,
    use_env: bool,
}

impl PolicyBuilder {
    /// Create a new policy builder with the compiled defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: GuardPolicy::default(),
            file_path: None,
            use_env: false,
        }
    }

    /// Load policy from a configuration file (YAML, TOML, or JSON)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        self.file_path = Some(path.to_path_buf());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let policy: GuardPolicy = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "YAML".to_string(),
                    source: Box::new(e),
                })?
            }
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                format: "TOML".to_string(),
                source: Box::new(e),
            })?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "JSON".to_string(),
                    source: Box::new(e),
                })?
            }
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    message: "file extension must be .yaml, .yml, .toml, or .json".to_string(),
                });
            }
        };

        self.base = policy;
        Ok(self)
    }

    /// Enable loading overrides from environment variables
    ///
    /// Looks for variables prefixed with `PAWGUARD_`, e.g.:
    /// - `PAWGUARD_ENABLED=false`
    /// - `PAWGUARD_RATE_WINDOW_SECS=30`
    /// - `PAWGUARD_RATE_MAX_REQUESTS=20`
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Build the final guard policy
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails or environment variables
    /// are invalid
    pub fn build(mut self) -> Result<GuardPolicy, ConfigError> {
        // Apply environment variable overrides
        if self.use_env {
            dotenvy::dotenv().ok(); // Load .env file if present

            if let Ok(enabled) = std::env::var("PAWGUARD_ENABLED") {
                self.base.enabled = enabled.parse().map_err(|_| ConfigError::EnvParse {
                    key: "PAWGUARD_ENABLED".to_string(),
                    message: "Must be 'true' or 'false'".to_string(),
                })?;
            }

            if let Ok(window) = std::env::var("PAWGUARD_RATE_WINDOW_SECS") {
                self.base.rate_limit.window_secs =
                    window.parse().map_err(|_| ConfigError::EnvParse {
                        key: "PAWGUARD_RATE_WINDOW_SECS".to_string(),
                        message: "Must be a non-negative integer".to_string(),
                    })?;
            }

            if let Ok(max) = std::env::var("PAWGUARD_RATE_MAX_REQUESTS") {
                self.base.rate_limit.max_requests =
                    max.parse().map_err(|_| ConfigError::EnvParse {
                        key: "PAWGUARD_RATE_MAX_REQUESTS".to_string(),
                        message: "Must be a non-negative integer".to_string(),
                    })?;
            }
        }

        // Validate the final policy
        self.base.validate()?;

        Ok(self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = GuardPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.version, "1.0");
        assert_eq!(policy.rate_limit.window_secs, 60);
        assert_eq!(policy.rate_limit.max_requests, 10);
        assert_eq!(policy.sanitizer.medication_name, 100);
        assert_eq!(policy.classifier.medium_threshold, 8);
    }

    #[test]
    fn policy_builder_defaults() {
        let policy = PolicyBuilder::new().build().unwrap();
        assert!(policy.enabled);
    }

    #[test]
    fn invalid_ratio_fails_validation() {
        let mut policy = GuardPolicy::default();
        policy.classifier.special_char_ratio = 1.5;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_round_trips_toml() {
        let policy = GuardPolicy::default();
        let text = toml::to_string(&policy).unwrap();
        let parsed: GuardPolicy = toml::from_str(&text).unwrap();
        assert_eq!(parsed.rate_limit.max_requests, policy.rate_limit.max_requests);
        assert_eq!(parsed.sanitizer.query, policy.sanitizer.query);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: GuardPolicy = toml::from_str(
            r#"
            [rate_limit]
            max_requests = 3
            "#,
        )
        .unwrap();
        assert_eq!(parsed.rate_limit.max_requests, 3);
        assert_eq!(parsed.rate_limit.window_secs, 60);
        assert_eq!(parsed.sanitizer.general_input, 1000);
        assert!(parsed.enabled);
    }
}
