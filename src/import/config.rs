use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ImportError, Result};
use crate::enex::ParseOptions;
use crate::onenote::FileSink;

/// Name of the scratch directory below the system temp dir.
pub const TEMP_DIR_NAME: &str = "ev2on";

/// Import settings as written in a config file. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Target notebook (defaults to the export's file stem)
    pub notebook_name: Option<String>,
    /// Skip notes dated before this (RFC 3339 or YYYY-MM-DD)
    pub cutoff_date: Option<String>,
    /// Date notes by `<updated>` instead of `<created>`
    pub use_modified_date: bool,
    /// Scratch directory for attachments and failed notes
    pub temp_dir: Option<PathBuf>,
    /// Root of the notebook store
    pub output_dir: Option<PathBuf>,
}

/// Settings of one run, with every default filled in.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub notebook_name: String,
    pub cutoff: Option<DateTime<Utc>>,
    pub use_modified_date: bool,
    pub temp_dir: PathBuf,
}

impl ImportSettings {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            use_modified_date: self.use_modified_date,
        }
    }
}

impl ImportConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        toml::from_str(&data)
            .map_err(|e| ImportError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve defaults for importing `enex_path`.
    pub fn settings_for(&self, enex_path: &Path) -> Result<ImportSettings> {
        let notebook_name = self
            .notebook_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                enex_path
                    .file_stem()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "Evernote".to_string());

        let cutoff = self
            .cutoff_date
            .as_deref()
            .map(parse_cutoff_date)
            .transpose()?;

        Ok(ImportSettings {
            notebook_name,
            cutoff,
            use_modified_date: self.use_modified_date,
            temp_dir: self.temp_dir(),
        })
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(TEMP_DIR_NAME))
    }

    pub fn output_dir(&self) -> Result<PathBuf> {
        self.output_dir
            .clone()
            .or_else(FileSink::default_root)
            .ok_or_else(|| ImportError::Config("no documents directory; pass an output directory".to_string()))
    }
}

/// Parse a cutoff given as RFC 3339 or as a plain date (midnight UTC).
pub fn parse_cutoff_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ImportError::Config(format!("invalid cutoff date \"{}\"", value)))
}
