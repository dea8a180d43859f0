use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 16_000,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Cap for each tab's transcript buffer, in bytes.
    pub output_buffer_max_bytes: usize,
    pub reconnect: ReconnectSettings,
    pub list_debounce_ms: u64,
    pub notification_dedupe_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            output_buffer_max_bytes: 500 * 1024,
            reconnect: ReconnectSettings::default(),
            list_debounce_ms: 300,
            notification_dedupe_ms: 2_000,
        }
    }
}

impl CoordinatorSettings {
    pub fn list_debounce(&self) -> Duration {
        Duration::from_millis(self.list_debounce_ms)
    }

    pub fn notification_dedupe(&self) -> Duration {
        Duration::from_millis(self.notification_dedupe_ms)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    version: String,
    settings: CoordinatorSettings,
}

#[derive(Debug)]
pub struct SettingsStorage {
    file_path: PathBuf,
}

impl SettingsStorage {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(home.join(".ssh-gui").join("coordinator.json"))
    }

    pub fn at(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn load_settings(&self) -> Result<CoordinatorSettings> {
        if !self.file_path.exists() {
            return Ok(CoordinatorSettings::default());
        }

        let contents = fs::read_to_string(&self.file_path).with_context(|| {
            format!("Failed to read settings file {}", self.file_path.display())
        })?;

        let file: SettingsFile =
            serde_json::from_str(&contents).context("Failed to parse settings file")?;

        Ok(file.settings)
    }

    pub fn save_settings(&self, settings: &CoordinatorSettings) -> Result<()> {
        if let Some(dir) = self.file_path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create settings directory {}", dir.display())
                })?;
            }
        }

        let file = SettingsFile {
            version: "1.0".to_string(),
            settings: settings.clone(),
        };

        let contents =
            serde_json::to_string_pretty(&file).context("Failed to serialize settings")?;

        fs::write(&self.file_path, contents).with_context(|| {
            format!("Failed to write settings file {}", self.file_path.display())
        })?;

        Ok(())
    }
}

impl Default for SettingsStorage {
    fn default() -> Self {
        Self::new()
    }
}
