//! Application Configuration
//!
//! Pipeline thresholds and collaborator endpoints stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::annotate::DEFAULT_LOW_CONFIDENCE_THRESHOLD;
use crate::pipeline::overlap::DEFAULT_IOU_THRESHOLD;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Enrichment pipeline settings
    pub pipeline: PipelineSettings,
    /// Detector service settings
    pub detector: DetectorSettings,
    /// Text-generation service settings
    pub generation: GenerationSettings,
    /// Storage overrides
    pub storage: StorageSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            detector: DetectorSettings::default(),
            generation: GenerationSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

/// Enrichment pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// IoU at or above which same-label boxes are duplicates
    pub iou_threshold: f64,
    /// Confidence below which a detection gets a verification issue flag
    pub low_confidence_threshold: f64,
    /// Labels counted as safety-critical equipment in scan statistics
    pub priority_labels: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            priority_labels: vec![
                "toolbox".to_string(),
                "fire extinguisher".to_string(),
                "oxygen tank".to_string(),
            ],
        }
    }
}

/// Detector service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Model-serving endpoint accepting image bytes
    pub endpoint: String,
    /// Raw detections below this confidence are discarded
    pub confidence_floor: f64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/detect".to_string(),
            confidence_floor: 0.25,
            timeout_secs: 30,
        }
    }
}

/// Text-generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Completion endpoint; canned fallback text is used when unset
    pub endpoint: Option<String>,
    /// Caller-enforced timeout in seconds before falling back
    pub timeout_secs: u64,
    /// Completion length cap
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
            max_tokens: 256,
        }
    }
}

/// Storage overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Database file, defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Uploads directory, defaults to the platform data directory
    pub uploads_dir: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
