use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

pub const TICK_INTERVAL_ENV: &str = "SESSION_PACER_TICK_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerSettings {
    /// Nominal countdown tick. Elapsed time is always measured, not assumed.
    pub tick_interval_ms: u64,
    /// Buffer size of the timer event channel.
    pub event_capacity: usize,
    pub default_exit_reason: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            event_capacity: 64,
            default_exit_reason: "candidate-ended".into(),
        }
    }
}

impl RunnerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(TICK_INTERVAL_ENV) {
            match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.tick_interval_ms = ms,
                _ => warn!("Ignoring {TICK_INTERVAL_ENV}={value:?}: expected a positive integer"),
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredSettings {
    runner: RunnerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StoredSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Settings at {} are unreadable ({err}); using defaults", path.display());
                StoredSettings::default()
            })
        } else {
            StoredSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored runner settings with environment overrides applied.
    pub fn runner(&self) -> RunnerSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .runner
            .clone()
            .with_env_overrides()
    }

    pub fn update_runner(&self, settings: RunnerSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.runner = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: StoredSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        Ok(())
    }

    fn persist(&self, data: &StoredSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
