//! Engine configuration.
//!
//! [`EngineSettings`] holds the sampling bounds and parsing vocabularies the
//! engine uses when it has to look at data to decide something: type
//! inference, delimiter detection, profiling and date parsing. Settings are
//! stored as JSON in the platform config directory and every field falls back
//! to its default when absent.

use crate::record::DateFormats;
use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Limits for example-driven program search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    /// Maximum number of pieces concatenated into one derived value; a date
    /// reordered around two separators takes five
    pub max_atoms: usize,
    /// Search stops after this many partial programs have been explored
    pub max_candidates: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_atoms: 5,
            max_candidates: 20_000,
        }
    }
}

/// Settings shared by every dataflow built from one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Rows sampled per column by type inference
    pub type_inference_sample_size: usize,
    /// Values sampled when auto-detecting a column split
    pub split_sample_size: usize,
    /// Rows scanned by profiling; `None` profiles every row
    pub profile_sample_size: Option<usize>,
    /// Text tokens that `replace_na` turns into nulls
    pub null_tokens: Vec<String>,
    /// chrono patterns tried, in order, when parsing dates
    pub date_formats: Vec<String>,
    /// chrono patterns tried, in order, when parsing datetimes
    pub datetime_formats: Vec<String>,
    pub synthesis: SynthesisSettings,
    /// Bytes read from a file when detecting its format
    pub sniff_bytes: usize,
    /// Lines read to build the schema of a JSON-lines source
    pub json_schema_sample: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            type_inference_sample_size: 200,
            split_sample_size: 100,
            profile_sample_size: None,
            null_tokens: [
                "", "NA", "N/A", "n/a", "na", "NaN", "nan", "NULL", "null", "None", "none", "-",
                "#N/A",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            date_formats: ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y", "%Y/%m/%d", "%d-%b-%Y"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            datetime_formats: [
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d %H:%M",
                "%m/%d/%Y %H:%M:%S",
                "%m/%d/%Y %H:%M",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            synthesis: SynthesisSettings::default(),
            sniff_bytes: 64 * 1024,
            json_schema_sample: 100,
        }
    }
}

impl EngineSettings {
    /// Default settings file location
    ///
    /// # Errors
    ///
    /// Returns error if the platform has no config directory.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("wrangle").join("settings.json"))
    }

    /// Load settings from the default location, or defaults if none are saved
    ///
    /// # Errors
    ///
    /// Returns error if a saved file exists but cannot be read, parsed or
    /// validated.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or fails
    /// [`Self::validate`].
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let settings: Self =
            serde_json::from_str(&contents).context("Failed to parse settings JSON")?;
        settings.validate()?;

        Ok(settings)
    }

    /// Save settings to the default location
    ///
    /// # Errors
    ///
    /// See [`Self::save_to`].
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns error naming the first out-of-range setting.
    pub fn validate(&self) -> Result<()> {
        if self.type_inference_sample_size == 0 {
            bail!("type_inference_sample_size must be at least 1");
        }
        if self.split_sample_size == 0 {
            bail!("split_sample_size must be at least 1");
        }
        if self.profile_sample_size == Some(0) {
            bail!("profile_sample_size must be at least 1 when set");
        }
        if self.synthesis.max_atoms == 0 || self.synthesis.max_candidates == 0 {
            bail!("synthesis limits must be at least 1");
        }
        if self.sniff_bytes < 64 {
            bail!("sniff_bytes must be at least 64");
        }
        if self.json_schema_sample == 0 {
            bail!("json_schema_sample must be at least 1");
        }
        for format in self.date_formats.iter().chain(&self.datetime_formats) {
            if format.trim().is_empty() {
                bail!("date and datetime formats must not be empty");
            }
        }
        Ok(())
    }

    /// Date patterns borrowed for value conversion.
    pub fn formats(&self) -> DateFormats<'_> {
        DateFormats::new(&self.date_formats, &self.datetime_formats)
    }
}
