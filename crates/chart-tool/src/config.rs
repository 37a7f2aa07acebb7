use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use chart_model::DEFAULT_BPM;

pub const DEFAULT_HISTORY_LIMIT: usize = 1024;
const MAX_HISTORY_LIMIT: usize = 65_536;
const MAX_OUTPUT_PRECISION: usize = 9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EditorConfig {
    /// Undo units kept before the oldest are dropped.
    pub history_limit: usize,
    pub clear_region_on_paste: bool,
    /// Paste by seconds instead of rows.
    pub time_based_paste: bool,
    /// Tempo of the row-0 BPM segment in new songs.
    pub default_bpm: f64,
    /// Decimal places for printed times.
    pub output_precision: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            clear_region_on_paste: true,
            time_based_paste: false,
            default_bpm: DEFAULT_BPM,
            output_precision: 3,
        }
    }
}

impl EditorConfig {
    pub fn validate(&mut self) {
        self.history_limit = self.history_limit.clamp(1, MAX_HISTORY_LIMIT);
        if !self.default_bpm.is_finite() || self.default_bpm <= 0.0 {
            self.default_bpm = DEFAULT_BPM;
        }
        self.output_precision = self.output_precision.min(MAX_OUTPUT_PRECISION);
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: EditorConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate();
        Ok(config)
    }

    /// Reads `path`, or returns the defaults if it does not exist.
    pub fn read_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::read(path)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}
