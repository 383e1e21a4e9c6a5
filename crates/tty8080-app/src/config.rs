use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tty8080_core::{ConsoleConfig, PortMap, DEFAULT_PROFILE};

pub const CONFIG_DIR_ENV: &str = "TTY8080_CONFIG_DIR";
const CONFIG_FILE: &str = "harness.json";

/// Harness preferences, read from `harness.json` in the config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Where settings profiles live. Defaults to the config directory.
    pub settings_dir: Option<PathBuf>,
    pub profile: String,
    pub data_in: u8,
    pub data_out: u8,
    pub status: u8,
    pub read_timeout_ms: Option<u64>,
    /// Use an in-memory loopback instead of a real serial port.
    pub loopback: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            settings_dir: None,
            profile: DEFAULT_PROFILE.to_string(),
            data_in: 0x01,
            data_out: 0x01,
            status: 0x02,
            read_timeout_ms: None,
            loopback: false,
        }
    }
}

impl HarnessConfig {
    pub fn config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .map(|dir| dir.join("tty8080"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Loads `harness.json` from `dir`; a missing file means defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn settings_dir(&self, config_dir: &Path) -> PathBuf {
        self.settings_dir
            .clone()
            .unwrap_or_else(|| config_dir.to_path_buf())
    }

    pub fn console_config(&self) -> ConsoleConfig {
        ConsoleConfig {
            profile: self.profile.clone(),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            ..ConsoleConfig::new(PortMap {
                data_in: self.data_in,
                data_out: self.data_out,
                status: self.status,
            })
        }
    }
}
