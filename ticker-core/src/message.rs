use serde::{Deserialize, Serialize};

use crate::headline::{headline_text, Article};
use crate::settings::{Settings, SettingsUpdate};

/// Messages received from other contexts (tickers, options surface).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Inbound {
    ContentScriptReady,
    /// The sending ticker went away; stop pushing to it.
    ContentScriptClosed,
    OpenOptions,
    UpdateSettings(SettingsUpdate),
    UpdateRefreshInterval { interval: u64 },
    ResetSettings,
    RefreshNow,
    #[serde(rename_all = "camelCase")]
    ValidateApiKey { api_key: String },
}

/// Messages pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outbound {
    UpdateHeadlines {
        articles: Vec<Article>,
        headlines: String,
    },
    Error {
        message: String,
    },
    InfoMessage {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    SettingsChanged {
        scroll_speed: u32,
        enable_ticker: bool,
    },
}

impl Outbound {
    pub fn headlines(articles: Vec<Article>) -> Self {
        let headlines = headline_text(&articles);
        Outbound::UpdateHeadlines { articles, headlines }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outbound::Error {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Outbound::InfoMessage {
            message: message.into(),
        }
    }

    pub fn settings_changed(settings: &Settings) -> Self {
        Outbound::SettingsChanged {
            scroll_speed: settings.scroll_speed,
            enable_ticker: settings.enable_ticker,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::UpdateHeadlines { .. } => "UPDATE_HEADLINES",
            Outbound::Error { .. } => "ERROR",
            Outbound::InfoMessage { .. } => "INFO_MESSAGE",
            Outbound::SettingsChanged { .. } => "SETTINGS_CHANGED",
        }
    }
}
