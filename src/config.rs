/*!
 * Configuration structures and defaults for Photocopy
 */

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PhotocopyError, Result};

/// Whether files are copied or moved into the destination tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Copy files, leaving the source tree untouched
    Copy,
    /// Move files: copy then delete the source
    Move,
}

impl Default for CopyMode {
    fn default() -> Self {
        Self::Copy
    }
}

/// Casing applied to expanded template variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCasing {
    /// Keep values as provided
    Original,
    /// Lowercase everything
    Lower,
    /// Uppercase everything
    Upper,
    /// Capitalize the first letter of each word
    Title,
}

impl Default for PathCasing {
    fn default() -> Self {
        Self::Original
    }
}

/// Finest location level that template variables may expose.
///
/// Levels coarser than the requested one blank the finer variables:
/// at `County`, `{city}` and `{district}` expand to nothing; at `State`,
/// `{county}` is blanked as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationGranularity {
    District,
    City,
    County,
    State,
    Country,
}

impl Default for LocationGranularity {
    fn default() -> Self {
        Self::City
    }
}

/// Log verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// Convert to a tracing level
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Main configuration for an organize run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Source directory to enumerate
    pub source: PathBuf,

    /// Destination path template, e.g. `/photos/{year}/{month}/{name}{ext}`
    pub destination: String,

    /// Copy or move
    pub mode: CopyMode,

    /// Suffix template for duplicate names, e.g. `-{number}`
    pub duplicates_format: String,

    /// Casing applied to expanded variables
    pub path_casing: PathCasing,

    /// Expand ISO country codes to full names
    pub use_full_country_names: bool,

    /// Finest location level exposed to the template
    pub location_granularity: LocationGranularity,

    /// Literal used when a location variable has no value and no fallback
    pub unknown_location_fallback: String,

    /// Skip files taken before this date
    pub min_date: Option<NaiveDate>,

    /// Skip files taken after this date
    pub max_date: Option<NaiveDate>,

    /// Skip files whose destination already exists
    pub skip_existing: bool,

    /// Overwrite existing destination files
    pub overwrite: bool,

    /// Number of parallel file operations (0 = auto, based on CPU count)
    pub parallelism: usize,

    /// Dry run mode (don't actually copy)
    pub dry_run: bool,

    /// Ignore any existing checkpoint and start over
    pub fresh_start: bool,

    /// Resume from a valid checkpoint without prompting
    pub resume: bool,

    /// Record every mutation to a transaction log for rollback
    pub enable_rollback: bool,

    /// Directory for checkpoint files (None = `.photocopy/` under the
    /// destination root)
    pub checkpoint_dir: Option<PathBuf>,

    /// Log verbosity
    pub log_level: LogLevel,

    /// Path to a log file (None = stdout)
    pub log_file: Option<PathBuf>,

    /// Shortcut for debug-level logging
    pub verbose: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: String::new(),
            mode: CopyMode::Copy,
            duplicates_format: "-{number}".to_string(),
            path_casing: PathCasing::Original,
            use_full_country_names: false,
            location_granularity: LocationGranularity::City,
            unknown_location_fallback: "unknown".to_string(),
            min_date: None,
            max_date: None,
            skip_existing: false,
            overwrite: false,
            parallelism: 0, // Auto-detect
            dry_run: false,
            fresh_start: false,
            resume: false,
            enable_rollback: false,
            checkpoint_dir: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

impl CopyConfig {
    /// Effective worker count for the executor pool
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism > 0 {
            self.parallelism
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// The longest literal prefix of the destination pattern, truncated to
    /// a directory. This is where checkpoint and transaction files live.
    pub fn destination_root(&self) -> PathBuf {
        destination_root(&self.destination)
    }
}

/// Longest literal directory prefix of a destination pattern.
///
/// The prefix ends at the first `{`; anything after the last separator
/// before that point is discarded since it may be a partial segment.
pub fn destination_root(pattern: &str) -> PathBuf {
    let literal = match pattern.find('{') {
        Some(idx) => &pattern[..idx],
        None => pattern,
    };

    let cut = literal.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    let root = &literal[..cut];

    // A pattern with no separator before the first variable has no usable
    // literal root; fall back to the current directory.
    if root.is_empty() {
        return PathBuf::from(".");
    }

    let trimmed = root.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

/// Configuration file structure (loaded from TOML)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: ConfigDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub duplicates_format: Option<String>,
    pub path_casing: Option<PathCasing>,
    pub location_granularity: Option<LocationGranularity>,
    pub unknown_location_fallback: Option<String>,
    pub use_full_country_names: Option<bool>,
    pub parallelism: Option<usize>,
    pub enable_rollback: Option<bool>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PhotocopyError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| PhotocopyError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Load configuration with fallback priority:
    /// 1. ./photocopy.toml (project-specific)
    /// 2. ~/.photocopy/photocopy.toml (user defaults)
    /// 3. Built-in defaults
    pub fn load_with_fallback() -> Self {
        if let Ok(config) = Self::load(Path::new("photocopy.toml")) {
            return config;
        }

        if let Some(home) = home_dir() {
            let user_config = home.join(".photocopy").join("photocopy.toml");
            if let Ok(config) = Self::load(&user_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Apply this config file to a CopyConfig
    pub fn apply_to(&self, config: &mut CopyConfig) {
        if let Some(ref format) = self.defaults.duplicates_format {
            config.duplicates_format = format.clone();
        }

        if let Some(casing) = self.defaults.path_casing {
            config.path_casing = casing;
        }

        if let Some(granularity) = self.defaults.location_granularity {
            config.location_granularity = granularity;
        }

        if let Some(ref fallback) = self.defaults.unknown_location_fallback {
            config.unknown_location_fallback = fallback.clone();
        }

        if let Some(full_names) = self.defaults.use_full_country_names {
            config.use_full_country_names = full_names;
        }

        if let Some(parallelism) = self.defaults.parallelism {
            config.parallelism = parallelism;
        }

        if let Some(rollback) = self.defaults.enable_rollback {
            config.enable_rollback = rollback;
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
