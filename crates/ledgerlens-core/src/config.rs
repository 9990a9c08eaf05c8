//! Import and anomaly configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the user override (~/.config/ledgerlens/config.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default value.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Settings for the import pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    /// Upper bound on PDF text extraction per document
    pub pdf_timeout: Duration,
    /// Leading CSV records searched for the header row
    pub header_scan_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            pdf_timeout: Duration::from_secs(30),
            header_scan_rows: 15,
        }
    }
}

/// Settings for the anomaly scorer
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    pub window_months: u32,
    /// Fewer transactions than this in the window resets every score
    pub min_transactions: usize,
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_months: 3,
            min_transactions: 10,
            trees: 100,
            sample_size: 256,
            seed: 42,
            high_threshold: 0.62,
            medium_threshold: 0.55,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerConfig {
    pub import: ImportConfig,
    pub anomaly: AnomalyConfig,
}

impl LedgerConfig {
    /// Load from an explicit path, the user override, or embedded defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?,
            None => match default_config_path() {
                Some(default_path) if default_path.exists() => fs::read_to_string(&default_path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        parse_config(&content)
    }

    /// Embedded defaults only
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ledgerlens").join("config.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    import: Option<RawImport>,
    anomaly: Option<RawAnomaly>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    pdf_timeout_secs: Option<u64>,
    header_scan_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawAnomaly {
    window_months: Option<u32>,
    min_transactions: Option<usize>,
    trees: Option<usize>,
    sample_size: Option<usize>,
    seed: Option<u64>,
    high_threshold: Option<f64>,
    medium_threshold: Option<f64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<LedgerConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = LedgerConfig::default();

    if let Some(import) = raw.import {
        if let Some(secs) = import.pdf_timeout_secs {
            config.import.pdf_timeout = Duration::from_secs(secs);
        }
        if let Some(rows) = import.header_scan_rows {
            config.import.header_scan_rows = rows;
        }
    }

    if let Some(anomaly) = raw.anomaly {
        let a = &mut config.anomaly;
        if let Some(v) = anomaly.window_months {
            a.window_months = v;
        }
        if let Some(v) = anomaly.min_transactions {
            a.min_transactions = v;
        }
        if let Some(v) = anomaly.trees {
            a.trees = v;
        }
        if let Some(v) = anomaly.sample_size {
            a.sample_size = v;
        }
        if let Some(v) = anomaly.seed {
            a.seed = v;
        }
        if let Some(v) = anomaly.high_threshold {
            a.high_threshold = v;
        }
        if let Some(v) = anomaly.medium_threshold {
            a.medium_threshold = v;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &LedgerConfig) -> Result<()> {
    let a = &config.anomaly;
    if a.trees == 0 || a.sample_size < 2 {
        return Err(Error::Config(
            "anomaly.trees must be positive and anomaly.sample_size at least 2".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&a.medium_threshold)
        || !(0.0..=1.0).contains(&a.high_threshold)
        || a.medium_threshold > a.high_threshold
    {
        return Err(Error::Config(format!(
            "anomaly thresholds must satisfy 0 <= medium ({}) <= high ({}) <= 1",
            a.medium_threshold, a.high_threshold
        )));
    }
    if a.window_months == 0 {
        return Err(Error::Config(
            "anomaly.window_months must be positive".to_string(),
        ));
    }
    if config.import.header_scan_rows == 0 {
        return Err(Error::Config(
            "import.header_scan_rows must be positive".to_string(),
        ));
    }
    if config.import.pdf_timeout.is_zero() {
        return Err(Error::Config(
            "import.pdf_timeout_secs must be positive".to_string(),
        ));
    }
    Ok(())
}
