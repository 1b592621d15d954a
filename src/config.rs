//! Run configuration for the emulator harness.
//!
//! Settings are layered, highest priority first:
//! 1. Command-line flags
//! 2. Project-local config file (`./tensorcore-emu.toml`)
//! 3. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # tensorcore-emu.toml
//!
//! # Restrict input precisions (default: all four)
//! precisions = ["FP16", "FP8_E4M3"]
//!
//! # Restrict output precisions (default: all four)
//! out_precisions = ["FP16"]
//!
//! rounding = "RNE"
//! seed = 42
//! max_cycles = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::fp::{Precision, RoundingMode};
use crate::pipe::DEFAULT_MAX_CYCLES;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "tensorcore-emu.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown precision '{0}'")]
    BadPrecision(String),

    #[error("unknown rounding mode '{0}'")]
    BadRoundingMode(String),
}

/// Raw file-level configuration; all fields optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Input precision names (see [`Precision::parse`]).
    pub precisions: Vec<String>,
    /// Output precision names.
    pub out_precisions: Vec<String>,
    /// Rounding mode mnemonic.
    pub rounding: Option<String>,
    /// RNG seed; 0 or absent means derive from the clock.
    pub seed: Option<u64>,
    /// Cycle cap for `run_to_completion`.
    pub max_cycles: Option<u32>,
}

impl FileConfig {
    /// Load from a TOML file. A missing file is not an error; it yields
    /// the defaults.
    pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(cfg)
    }
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub precisions: Vec<Precision>,
    pub out_precisions: Vec<Precision>,
    pub rm: RoundingMode,
    /// Test selector; 0 runs everything.
    pub test_id: u32,
    pub seed: u64,
    pub max_cycles: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            precisions: Precision::INPUTS.to_vec(),
            out_precisions: Precision::OUTPUTS.to_vec(),
            rm: RoundingMode::Rne,
            test_id: 0,
            seed: 0,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

impl RunConfig {
    /// Resolve a file config into a run config; empty lists fall back to
    /// the full precision sets.
    pub fn from_file(file: &FileConfig) -> Result<RunConfig, ConfigError> {
        let mut cfg = RunConfig::default();
        if !file.precisions.is_empty() {
            cfg.precisions = parse_precisions(&file.precisions)?;
        }
        if !file.out_precisions.is_empty() {
            cfg.out_precisions = parse_precisions(&file.out_precisions)?;
        }
        if let Some(rm) = &file.rounding {
            cfg.rm = RoundingMode::parse(rm)
                .ok_or_else(|| ConfigError::BadRoundingMode(rm.clone()))?;
        }
        if let Some(seed) = file.seed {
            cfg.seed = seed;
        }
        if let Some(mc) = file.max_cycles {
            cfg.max_cycles = mc;
        }
        Ok(cfg)
    }
}

fn parse_precisions(names: &[String]) -> Result<Vec<Precision>, ConfigError> {
    names
        .iter()
        .map(|n| Precision::parse(n).ok_or_else(|| ConfigError::BadPrecision(n.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.precisions.len(), 4);
        assert_eq!(cfg.out_precisions.len(), 4);
        assert_eq!(cfg.rm, RoundingMode::Rne);
        assert_eq!(cfg.max_cycles, DEFAULT_MAX_CYCLES);
    }

    #[test]
    fn test_resolve_file_config() {
        let file: FileConfig = toml::from_str(
            r#"
            precisions = ["FP16", "E4M3"]
            rounding = "RTZ"
            seed = 7
            "#,
        )
        .unwrap();
        let cfg = RunConfig::from_file(&file).unwrap();
        assert_eq!(cfg.precisions, vec![Precision::Fp16, Precision::Fp8E4M3]);
        assert_eq!(cfg.rm, RoundingMode::Rtz);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.out_precisions.len(), 4);
    }

    #[test]
    fn test_bad_names_are_rejected() {
        let file: FileConfig = toml::from_str(r#"precisions = ["FP12"]"#).unwrap();
        assert!(matches!(
            RunConfig::from_file(&file),
            Err(ConfigError::BadPrecision(_))
        ));
        let file: FileConfig = toml::from_str(r#"rounding = "NEAREST""#).unwrap();
        assert!(matches!(
            RunConfig::from_file(&file),
            Err(ConfigError::BadRoundingMode(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = FileConfig::load(Path::new("/nonexistent/tensorcore-emu.toml")).unwrap();
        assert!(cfg.precisions.is_empty());
        assert!(cfg.rounding.is_none());
    }
}
