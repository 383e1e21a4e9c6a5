use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, Notifier};

pub const DEFAULT_PROFILE: &str = "defaultConsoleSettings";
pub const FILE_SUFFIX: &str = "ser";

#[cfg(windows)]
pub const FALLBACK_PORT: &str = "COM2";
#[cfg(not(windows))]
pub const FALLBACK_PORT: &str = "/dev/ttyS1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn count(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }

    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            5 => Some(DataBits::Five),
            6 => Some(DataBits::Six),
            7 => Some(DataBits::Seven),
            8 => Some(DataBits::Eight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        })
    }
}

impl std::str::FromStr for StopBits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            other => Err(format!("invalid stop bits: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "None",
            Parity::Odd => "Odd",
            Parity::Even => "Even",
            Parity::Mark => "Mark",
            Parity::Space => "Space",
        })
    }
}

impl std::str::FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "None" => Parity::None,
            "Odd" => Parity::Odd,
            "Even" => Parity::Even,
            "Mark" => Parity::Mark,
            "Space" => Parity::Space,
            other => return Err(format!("invalid parity: {other}")),
        })
    }
}

/// The serial parameters a console connects with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port_name: FALLBACK_PORT.to_string(),
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Formats as `port-baud-data-stop-parity`, e.g. `COM2-9600-8-1-None`.
impl fmt::Display for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.port_name,
            self.baud_rate,
            self.data_bits.count(),
            self.stop_bits,
            self.parity
        )
    }
}

/// Persists [`ConnectionSettings`] as one `<profile>.ser` file per profile
/// inside a directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
    notifier: Notifier,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>, notifier: Notifier) -> Self {
        Self {
            dir: dir.into(),
            notifier,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("{profile}.{FILE_SUFFIX}"))
    }

    /// Loads a profile, falling back to defaults if the file is missing or
    /// unreadable. The fallback is reported, never returned as an error.
    pub fn load(&self, profile: &str) -> ConnectionSettings {
        let path = self.path_for(profile);
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                serde_json::from_str::<ConnectionSettings>(&text).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(settings) => {
                log::debug!("loaded {} from {}", settings, path.display());
                settings
            }
            Err(reason) => {
                self.notifier
                    .report(ConsoleError::SettingsLoadFailed { path, reason });
                ConnectionSettings::default()
            }
        }
    }

    pub fn save(&self, profile: &str, settings: &ConnectionSettings) -> Result<(), ConsoleError> {
        let path = self.path_for(profile);
        let result = serde_json::to_string_pretty(settings)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                fs::create_dir_all(&self.dir).map_err(|e| e.to_string())?;
                fs::write(&path, text).map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => {
                log::debug!("saved {} to {}", settings, path.display());
                Ok(())
            }
            Err(reason) => {
                let err = ConsoleError::SettingsSaveFailed { path, reason };
                self.notifier.report(err.clone());
                Err(err)
            }
        }
    }
}
