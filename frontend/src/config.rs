//! Host-side configuration: sample rate, window scale, key bindings, and
//! the last-loaded binary path. This is frontend state, not emulator
//! state — persisting it does not run afoul of the "no persistence of
//! emulator state" non-goal.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_scale")]
    pub video_scale: u32,
    #[serde(default)]
    pub key_bindings: HashMap<String, String>,
    #[serde(default)]
    pub last_binary_path: Option<PathBuf>,
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_scale() -> u32 {
    2
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            sample_rate: default_sample_rate(),
            video_scale: default_scale(),
            key_bindings: HashMap::new(),
            last_binary_path: None,
        }
    }
}

impl HostConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("retrochip").join("config.toml"))
    }

    /// Loads the config file, creating one with defaults if it does not
    /// exist yet. Falls back to defaults (without writing anything) if no
    /// config directory can be resolved for this platform.
    pub fn load_or_default() -> HostConfig {
        let Some(path) = Self::config_path() else {
            return HostConfig::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
                log::warn!("config file at {} is invalid ({e}); using defaults", path.display());
                HostConfig::default()
            }),
            Err(_) => {
                let config = HostConfig::default();
                if let Err(e) = config.save() {
                    log::warn!("could not write default config: {e}");
                }
                config
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).expect("HostConfig always serialises");
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = HostConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sample_rate, config.sample_rate);
        assert_eq!(parsed.video_scale, config.video_scale);
    }
}
