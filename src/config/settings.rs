use serde::{Deserialize, Serialize};

use crate::error::EepromError;

/// Connection and collection settings, stored next to the executable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpSettings {
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Stop reading once the firmware stays quiet this long
    pub idle_timeout_ms: u64,
    /// Marlin resets on connect; wait before sending
    pub startup_delay_ms: u64,
    pub request_stats: bool,
    /// Extra schema table (plugin JSON layout) overlaid on the built-in one
    pub schema_path: Option<String>,
}

impl Default for DumpSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            idle_timeout_ms: 2_000,
            startup_delay_ms: 2_000,
            request_stats: false,
            schema_path: None,
        }
    }
}

impl DumpSettings {
    fn json_path() -> std::path::PathBuf {
        std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or(std::path::Path::new("."))
            .join("settings.json")
    }

    pub fn load() -> Self {
        let path = Self::json_path();
        match std::fs::read_to_string(&path) {
            Ok(data) => Self::from_json(&data).unwrap_or_else(|e| {
                log::warn!("Ignoring {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn from_json(data: &str) -> Result<Self, EepromError> {
        serde_json::from_str(data).map_err(|e| EepromError::Config(e.to_string()))
    }

    pub fn save(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(Self::json_path(), json) {
                    log::warn!("Could not save settings: {e}");
                }
            }
            Err(e) => log::warn!("Could not serialize settings: {e}"),
        }
    }
}
