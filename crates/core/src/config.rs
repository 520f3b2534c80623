use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use looma_decode::{DEFAULT_EXTENSION, DEFAULT_SAMPLES_ROOT};
use looma_engine::DEFAULT_COMMAND_CAPACITY;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::modules::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinauralSettings {
    pub base_hz: f32,
    pub beat_hz: f32,
}

impl Default for BinauralSettings {
    fn default() -> Self {
        Self {
            base_hz: 200.0,
            beat_hz: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory sample assets are resolved against.
    pub samples_root: PathBuf,
    pub sample_extension: String,
    /// Whether sample pads loop until toggled off.
    pub loop_samples: bool,
    pub default_module: ModuleId,
    /// Initial master volume, 0 to 100.
    pub master_volume: f32,
    pub binaural: BinauralSettings,
    /// Pads enabled when the engine starts, per module.
    pub pads: BTreeMap<ModuleId, Vec<String>>,
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            samples_root: PathBuf::from(DEFAULT_SAMPLES_ROOT),
            sample_extension: DEFAULT_EXTENSION.to_string(),
            loop_samples: true,
            default_module: ModuleId::default(),
            master_volume: 80.0,
            binaural: BinauralSettings::default(),
            pads: BTreeMap::new(),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

impl EngineConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("looma").join("config.toml"))
    }

    /// Load the user's config file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                warn!("ignoring invalid config at {}: {e}", path.display());
                Self::default()
            }),
            Err(e) => {
                debug!("no config at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").expect("parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.binaural.base_hz, 200.0);
        assert_eq!(config.master_volume, 80.0);
    }

    #[test]
    fn test_partial_config() {
        let config = EngineConfig::from_toml_str(
            r#"
            samples_root = "/opt/looma/samples"
            default_module = "binaural"
            master_volume = 55.0

            [binaural]
            base_hz = 300.0
            beat_hz = 6.0

            [pads]
            lofi = ["drums1", "vinyl"]
            "#,
        )
        .expect("parse");

        assert_eq!(config.samples_root, PathBuf::from("/opt/looma/samples"));
        assert_eq!(config.default_module, ModuleId::Binaural);
        assert_eq!(config.binaural.beat_hz, 6.0);
        assert_eq!(config.pads[&ModuleId::Lofi], vec!["drums1", "vinyl"]);
        assert_eq!(config.sample_extension, "mp3");
    }

    #[test]
    fn test_unknown_module_is_rejected() {
        assert!(EngineConfig::from_toml_str(r#"default_module = "ambient""#).is_err());
    }
}
