use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use facegate_core::shared::constants::DEFAULT_SCORE_THRESHOLD;

/// JSON settings file; every field is optional and CLI flags win over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub immediate: bool,
    pub score_threshold: f64,
    pub input_size: String,
    pub dead_zone_ratio: f64,
    pub model: ModelSetting,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSetting {
    #[default]
    Default,
    File(PathBuf),
    Directory(PathBuf),
    AssetRoot(PathBuf),
    Url(String),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            immediate: true,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            input_size: "lg".to_string(),
            dead_zone_ratio: 0.0,
            model: ModelSetting::Default,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read settings {}: {e}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid settings {}: {e}", path.display()))?;
        Ok(settings)
    }
}
