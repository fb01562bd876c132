// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the invoice
//! pipeline.
//!
//! Provides [`PipelineSettings`] — the top-level runtime settings —
//! with TOML loading, `INV_*` environment overrides, and advisory
//! [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use inv_model::ProcessingThresholds;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A timeout is unusually large.
    LargeTimeout {
        /// Which call the timeout guards.
        call: String,
        /// Timeout value in seconds.
        secs: u64,
    },
    /// The layout cache ceiling is very small.
    TinyLayoutCache {
        /// Configured capacity.
        capacity: usize,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::LargeTimeout { call, secs } => {
                write!(f, "{call} timeout is large ({secs}s)")
            }
            ConfigWarning::TinyLayoutCache { capacity } => {
                write!(f, "layout cache capacity {capacity} will thrash")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Log level override (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,

    /// Directory for the audit log.
    pub audit_dir: String,

    /// HTTP bind address for the server.
    pub bind: String,

    /// Decision and rule thresholds.
    pub thresholds: ProcessingThresholds,

    /// Per-call timeouts.
    pub timeouts: Timeouts,

    /// Extractor tuning.
    pub extractor: ExtractorSettings,
}

/// Per-call timeout settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    /// OCR call timeout in seconds.
    pub ocr_secs: u64,
    /// LLM call timeout in seconds.
    pub llm_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ocr_secs: 60,
            llm_secs: 60,
        }
    }
}

/// Extractor tuning.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Vendor layout cache ceiling.
    pub layout_cache_capacity: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            layout_cache_capacity: 256,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            audit_dir: "audit".to_string(),
            bind: "127.0.0.1:8080".to_string(),
            thresholds: ProcessingThresholds::default(),
            timeouts: Timeouts::default(),
            extractor: ExtractorSettings::default(),
        }
    }
}

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LARGE_TIMEOUT_THRESHOLD: u64 = 600;

impl PipelineSettings {
    /// Validate semantics and collect advisory warnings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every problem.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            reasons.push(format!("unknown log level '{}'", self.log_level));
        }
        if let Err(e) = self.thresholds.validate() {
            reasons.push(e.to_string());
        }
        if self.timeouts.ocr_secs == 0 || self.timeouts.llm_secs == 0 {
            reasons.push("timeouts must be at least 1s".to_string());
        }
        if self.extractor.layout_cache_capacity == 0 {
            reasons.push("layout_cache_capacity must be at least 1".to_string());
        }

        if self.timeouts.ocr_secs > LARGE_TIMEOUT_THRESHOLD {
            warnings.push(ConfigWarning::LargeTimeout {
                call: "ocr".to_string(),
                secs: self.timeouts.ocr_secs,
            });
        }
        if self.timeouts.llm_secs > LARGE_TIMEOUT_THRESHOLD {
            warnings.push(ConfigWarning::LargeTimeout {
                call: "llm".to_string(),
                secs: self.timeouts.llm_secs,
            });
        }
        if (1..8).contains(&self.extractor.layout_cache_capacity) {
            warnings.push(ConfigWarning::TinyLayoutCache {
                capacity: self.extractor.layout_cache_capacity,
            });
        }

        if reasons.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::ValidationError { reasons })
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load settings from an optional TOML file path.
///
/// With `None` the defaults are returned. Environment overrides are
/// applied on top in both cases.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file is missing or unparseable.
pub fn load_settings(path: Option<&Path>) -> Result<PipelineSettings, ConfigError> {
    let mut settings = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => PipelineSettings::default(),
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Parse a TOML string into settings.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] on invalid TOML.
pub fn parse_toml(content: &str) -> Result<PipelineSettings, ConfigError> {
    toml::from_str::<PipelineSettings>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment variable overrides.
///
/// Recognised variables: `INV_LOG_LEVEL`, `INV_AUDIT_DIR`, `INV_BIND`.
pub fn apply_env_overrides(settings: &mut PipelineSettings) {
    if let Ok(val) = std::env::var("INV_LOG_LEVEL") {
        settings.log_level = val;
    }
    if let Ok(val) = std::env::var("INV_AUDIT_DIR") {
        settings.audit_dir = val;
    }
    if let Ok(val) = std::env::var("INV_BIND") {
        settings.bind = val;
    }
}
