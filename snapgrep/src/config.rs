use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{SearchError, SearchResult};

/// How to turn line bytes into preview text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Invalid UTF-8 in a matched line aborts the scan
    FailFast,
    /// Invalid UTF-8 is replaced with U+FFFD
    #[default]
    Lossy,
}

/// Limits and runtime knobs for a scan.
///
/// The defaults are the production limits; a config file only needs to name
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Hard ceiling on matching files per scan
    #[serde(default = "default_max_file_matches")]
    pub max_file_matches: usize,

    /// Maximum matched lines reported per file
    #[serde(default = "default_max_line_matches")]
    pub max_line_matches: usize,

    /// Maximum match offsets reported per line
    #[serde(default = "default_max_offsets")]
    pub max_offsets: usize,

    /// Lines longer than this many bytes are not scanned
    /// (e.g. minified javascript that is all on one line)
    #[serde(default = "default_max_line_size")]
    pub max_line_size: usize,

    /// Number of concurrent workers per scan
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Share of the caller's remaining time the scan may use
    #[serde(default = "default_deadline_fraction")]
    pub deadline_fraction: f64,

    /// Files larger than this are left out of an archive when it is built
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// How to decode preview lines
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional overall time budget, e.g. "2s" or "500ms"
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_max_file_matches() -> usize {
    1000
}

fn default_max_line_matches() -> usize {
    100
}

fn default_max_offsets() -> usize {
    10
}

fn default_max_line_size() -> usize {
    500
}

fn default_num_workers() -> usize {
    8
}

fn default_deadline_fraction() -> f64 {
    0.9
}

fn default_max_file_size() -> u64 {
    1 << 20
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_matches: default_max_file_matches(),
            max_line_matches: default_max_line_matches(),
            max_offsets: default_max_offsets(),
            max_line_size: default_max_line_size(),
            num_workers: default_num_workers(),
            deadline_fraction: default_deadline_fraction(),
            max_file_size: default_max_file_size(),
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
            timeout: None,
        }
    }
}

impl ScanConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            // Global config
            dirs::config_dir().map(|p| p.join("snapgrep/config.yaml")),
            // Local config
            Some(PathBuf::from(".snapgrep.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicitly requested file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Checks that the limits describe a scan that can actually run
    pub fn validate(&self) -> SearchResult<()> {
        if self.num_workers == 0 {
            return Err(SearchError::config_error("num_workers must be positive"));
        }
        if !(self.deadline_fraction > 0.0 && self.deadline_fraction <= 1.0) {
            return Err(SearchError::config_error(format!(
                "deadline_fraction must be in (0, 1], got {}",
                self.deadline_fraction
            )));
        }
        if self.max_file_matches == 0
            || self.max_line_matches == 0
            || self.max_offsets == 0
            || self.max_line_size == 0
        {
            return Err(SearchError::config_error("match limits must be positive"));
        }
        self.timeout_duration()?;
        Ok(())
    }

    /// Parses `timeout` into a duration
    pub fn timeout_duration(&self) -> SearchResult<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|t| {
                humantime::parse_duration(t)
                    .map_err(|e| SearchError::config_error(format!("invalid timeout {t:?}: {e}")))
            })
            .transpose()
    }

    /// Clamps a requested file match limit to the configured ceiling.
    /// Zero, negative and oversized requests all mean "use the ceiling".
    pub fn effective_file_match_limit(&self, requested: i64) -> usize {
        if requested <= 0 || requested as u64 > self.max_file_matches as u64 {
            self.max_file_matches
        } else {
            requested as usize
        }
    }

    /// Renders the configuration as YAML
    pub fn to_yaml(&self) -> SearchResult<String> {
        serde_yaml::to_string(self).map_err(|e| SearchError::config_error(e.to_string()))
    }

    /// Merges CLI overrides with configuration file values
    pub fn merge_with_cli(mut self, overrides: CliOverrides) -> Self {
        if let Some(workers) = overrides.num_workers {
            self.num_workers = workers;
        }
        if let Some(timeout) = overrides.timeout {
            self.timeout = Some(timeout);
        }
        if let Some(mode) = overrides.encoding_mode {
            self.encoding_mode = mode;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        self
    }
}

/// Values given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub num_workers: Option<usize>,
    pub timeout: Option<String>,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
}
