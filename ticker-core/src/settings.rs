use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_SCROLL_SPEED: u32 = 50;
/// Longer intervals are accepted but the timer never waits more than a week.
const MAX_REFRESH_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// User-editable settings, stored whole under the `settings` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub refresh_interval: u64,
    pub scroll_speed: u32,
    pub enable_ticker: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL_MINUTES,
            scroll_speed: DEFAULT_SCROLL_SPEED,
            enable_ticker: true,
        }
    }
}

impl Settings {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.min(MAX_REFRESH_INTERVAL_MINUTES) * 60)
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Merges a partial update; fields absent from `update` keep their value.
    pub fn merged(&self, update: &SettingsUpdate) -> Result<Settings, SettingsError> {
        update.validate()?;
        Ok(Settings {
            api_key: update
                .api_key
                .as_ref()
                .map(|key| key.trim().to_owned())
                .unwrap_or_else(|| self.api_key.clone()),
            refresh_interval: update.refresh_interval.unwrap_or(self.refresh_interval),
            scroll_speed: update.scroll_speed.unwrap_or(self.scroll_speed),
            enable_ticker: update.enable_ticker.unwrap_or(self.enable_ticker),
        })
    }

    /// Stored values from older versions may be out of range.
    pub fn sanitized(mut self) -> Self {
        if self.refresh_interval == 0 {
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL_MINUTES;
        }
        self.scroll_speed = self.scroll_speed.clamp(1, 100);
        self
    }
}

/// Partial settings as carried by `UPDATE_SETTINGS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_speed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_ticker: Option<bool>,
}

impl SettingsUpdate {
    pub fn refresh_interval(minutes: u64) -> Self {
        Self {
            refresh_interval: Some(minutes),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.refresh_interval == Some(0) {
            return Err(SettingsError::ZeroRefreshInterval);
        }
        if let Some(speed) = self.scroll_speed {
            if !(1..=100).contains(&speed) {
                return Err(SettingsError::ScrollSpeedOutOfRange(speed));
            }
        }
        Ok(())
    }
}
